use crate::producer::ProducerConfig;
use crate::server::{FixtureHttpState, ServerConfig, ServerHandle};

/// Starts a fixture server on an ephemeral localhost port.
///
/// Returns `None` when the sandbox forbids binding to localhost, so socket
/// tests can skip instead of failing.
pub async fn spawn_local_server(producer: ProducerConfig) -> Option<ServerHandle> {
    let listener = match tokio::net::TcpListener::bind(("127.0.0.1", 0)).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping socket test: sandbox forbids binding to localhost");
            return None;
        }
        Err(err) => panic!("failed to bind localhost for socket tests: {err}"),
    };

    let config = ServerConfig {
        producer,
        ..ServerConfig::default()
    };
    let handle = crate::server::spawn(listener, FixtureHttpState::new(&config))
        .unwrap_or_else(|err| panic!("failed to start fixture server: {err}"));
    Some(handle)
}
