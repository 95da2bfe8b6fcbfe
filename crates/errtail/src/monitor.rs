//! Pipeline lifecycle: startup gate, task spawning, coordinated shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::LinePatterns;
use crate::config::Config;
use crate::error::MonitorError;
use crate::probe;
use crate::queue;
use crate::reader::SourceReader;
use crate::sender::BatchSender;
use crate::source::{DockerLogSource, LogSource};

/// How long a full queue may delay the shutdown sentinel.
const SENTINEL_TIMEOUT: Duration = Duration::from_secs(1);

/// Grace period for readers and the sender to drain after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Owns the whole pipeline: one reader per source, one queue, one sender.
///
/// Cancellation of the token returned by [`cancellation_token`] is the only
/// stop signal; every task observes it cooperatively.
///
/// [`cancellation_token`]: Monitor::cancellation_token
pub struct Monitor {
    config: Config,
    source: Arc<dyn LogSource>,
    cancel: CancellationToken,
}

impl Monitor {
    /// Monitor docker containers, the stock deployment.
    pub fn new(config: Config) -> Result<Self, MonitorError> {
        Monitor::with_source(config, Arc::new(DockerLogSource::default()))
    }

    /// Monitor with an injected source implementation.
    pub fn with_source(config: Config, source: Arc<dyn LogSource>) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Monitor {
            config,
            source,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the monitor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the cancellation token fires, then drain and stop.
    pub async fn run(self) -> Result<(), MonitorError> {
        info!(
            sources = self.config.sources.len(),
            host = %self.config.host,
            endpoint = %self.config.ingest_url,
            "starting log monitor"
        );

        let (host, port) = self.config.endpoint_addr()?;
        probe::wait_for_endpoint(
            &host,
            port,
            self.config.connect_timeout,
            self.config.boot_timeout,
            self.config.boot_poll,
            &self.cancel,
        )
        .await;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let patterns = LinePatterns::compile(&self.config)?;
        let (queue, rx) = queue::bounded(self.config.queue_max_size);
        let sender = BatchSender::new(&self.config, rx, self.cancel.clone())?;

        let mut readers = JoinSet::new();
        for source_id in &self.config.sources {
            let reader = SourceReader::new(
                &self.config,
                Arc::clone(&patterns),
                source_id,
                queue.clone(),
                self.cancel.clone(),
            );
            readers.spawn(reader.run(Arc::clone(&self.source)));
        }
        let sender_task = tokio::spawn(sender.run());

        self.cancel.cancelled().await;
        info!("shutdown requested, draining pipeline");

        // Wake a parked sender; if the queue is full it will observe the
        // token within one poll instead.
        queue.signal_shutdown(SENTINEL_TIMEOUT).await;

        let drain = async {
            while readers.join_next().await.is_some() {}
            let _ = sender_task.await;
        };
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, drain).await;

        let dropped = queue.dropped();
        if dropped > 0 {
            warn!(dropped, "events were dropped under overload during this run");
        }

        match drained {
            Ok(()) => {
                info!("log monitor stopped");
                Ok(())
            }
            // Dropping the JoinSet aborts whatever is still running.
            Err(_) => Err(MonitorError::ShutdownTimeout),
        }
    }
}
