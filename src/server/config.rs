use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fixture::{MAX_BODY_CAPACITY, MIDDLEWARE_ROUTE};
use crate::{Error, Result};
use crate::producer::ProducerConfig;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Path the edge middleware intercepts.
    pub middleware_matcher: String,
    /// Chunks buffered between a node-runtime producer and the socket.
    pub body_capacity: usize,
    pub producer: ProducerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            middleware_matcher: MIDDLEWARE_ROUTE.to_string(),
            body_capacity: 1,
            producer: ProducerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BODY_CAPACITY).contains(&self.body_capacity) {
            return Err(Error::InvalidConfig(format!(
                "body_capacity must be between 1 and {MAX_BODY_CAPACITY}, got {}",
                self.body_capacity
            )));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ServerConfig::from_toml_str("").expect("parse");
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.producer.bound, 25);
        assert_eq!(config.middleware_matcher, "/middleware");
    }

    #[test]
    fn nested_producer_table() {
        let config = ServerConfig::from_toml_str(
            r#"
listen = "0.0.0.0:8080"
body_capacity = 4

[producer]
interval_ms = 10
"#,
        )
        .expect("parse");

        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.body_capacity, 4);
        assert_eq!(config.producer.interval_ms, 10);
        assert_eq!(config.producer.bound, 25);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fixtures.toml");
        std::fs::write(&path, "middleware_matcher = \"/mw\"\n").expect("write");

        let config = ServerConfig::load(&path).expect("load");
        assert_eq!(config.middleware_matcher, "/mw");

        let missing = ServerConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, crate::Error::Io(_)));
    }

    #[test]
    fn rejects_wrong_types() {
        let err = ServerConfig::from_toml_str("body_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn rejects_out_of_range_body_capacity() {
        for raw in ["body_capacity = 0", "body_capacity = 9223372036854775807"] {
            let err = ServerConfig::from_toml_str(raw).unwrap_err();
            assert!(matches!(err, crate::Error::InvalidConfig(_)), "{raw}: {err}");
        }

        let config = ServerConfig::from_toml_str(&format!("body_capacity = {MAX_BODY_CAPACITY}"))
            .expect("largest capacity is accepted");
        assert_eq!(config.body_capacity, MAX_BODY_CAPACITY);
    }
}
