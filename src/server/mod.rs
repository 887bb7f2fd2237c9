//! HTTP surfaces for the fixtures.

mod config;
mod http;

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::Result;

pub use config::ServerConfig;
pub use http::{FixtureHttpState, router};

/// A server running on a background task. Dropping the handle stops it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    state: FixtureHttpState,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn state(&self) -> &FixtureHttpState {
        &self.state
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spawn(listener: TcpListener, state: FixtureHttpState) -> Result<ServerHandle> {
    let local_addr = listener.local_addr()?;
    let app = router(state.clone());
    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "fixture server stopped");
        }
    });

    Ok(ServerHandle {
        local_addr,
        state,
        task,
    })
}

pub async fn serve(config: ServerConfig) -> Result<()> {
    config.validate()?;
    let listener = TcpListener::bind(&config.listen).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(
        %local_addr,
        interval_ms = config.producer.interval_ms,
        bound = config.producer.bound,
        "fixture server listening"
    );

    let app = router(FixtureHttpState::new(&config));
    axum::serve(listener, app).await?;
    Ok(())
}
