//! Startup reachability gate for the ingestion endpoint.
//!
//! Co-deployed intakes are usually still booting when the monitor starts, so
//! the pipeline waits for a successful TCP connect before spawning readers.
//! The gate is advisory: once the overall boot window elapses the monitor
//! proceeds anyway and leans on delivery retries.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Wait until `host:port` accepts a TCP connection.
///
/// Polls every `poll` with `connect_timeout` per attempt, up to `boot_timeout`
/// overall. Returns `true` once reachable, `false` if the window elapsed or
/// the token was cancelled.
pub async fn wait_for_endpoint(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    boot_timeout: Duration,
    poll: Duration,
    cancel: &CancellationToken,
) -> bool {
    info!(host, port, "waiting for ingestion endpoint");
    let deadline = Instant::now() + boot_timeout;

    loop {
        match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => {
                info!(host, port, "ingestion endpoint is reachable");
                return true;
            }
            Ok(Err(e)) => debug!(host, port, "endpoint not reachable yet: {e}"),
            Err(_) => debug!(host, port, "endpoint connect attempt timed out"),
        }

        if Instant::now() + poll > deadline {
            error!(
                host,
                port,
                timeout_secs = boot_timeout.as_secs(),
                "ingestion endpoint still unreachable, proceeding without it"
            );
            return false;
        }

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(poll) => {}
        }
    }
}
