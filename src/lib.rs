//! Fixtures and a probe for checking that a dropped client connection cancels
//! the stream feeding its response.

mod error;
pub mod fixture;
pub mod logging;
pub mod producer;
pub mod server;
pub mod signal;
pub mod utils;

#[cfg(feature = "driver")]
pub mod driver;

pub use error::{Error, Result};
pub use fixture::{FIXTURE_ROUTES, Fixture, Fixtures, RouteKind, Runtime, Surface};
pub use producer::{Completion, Producer, ProducerConfig, Readable, Streamable};
pub use server::{FixtureHttpState, ServerConfig, ServerHandle, router, serve, spawn};
pub use signal::{AbortSignal, Deferred, Settlement};

#[cfg(feature = "driver")]
pub use driver::{Driver, ProbeOptions, ProbeReport};
