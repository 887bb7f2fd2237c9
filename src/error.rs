use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[cfg(feature = "driver")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response from {route}: {reason}")]
    InvalidResponse { route: String, reason: String },
    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, Error>;
