//! Per-source reader task.
//!
//! One [`SourceReader`] per configured source: it opens the source's line
//! stream, feeds every line through its private [`Classifier`], and enqueues
//! the resulting events. Ended or failed streams are re-opened after a fixed
//! delay; a permanently unavailable source stops its reader without taking
//! the rest of the pipeline down.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::classifier::{Classifier, LinePatterns};
use crate::config::Config;
use crate::queue::EventQueue;
use crate::source::{LineStream, LogSource, SourceError};

pub struct SourceReader {
    source_id: String,
    classifier: Classifier,
    queue: EventQueue,
    restart_delay: Duration,
    cancel: CancellationToken,
}

impl SourceReader {
    pub fn new(
        config: &Config,
        patterns: Arc<LinePatterns>,
        source_id: &str,
        queue: EventQueue,
        cancel: CancellationToken,
    ) -> Self {
        SourceReader {
            source_id: source_id.to_string(),
            classifier: Classifier::new(patterns, config, source_id),
            queue,
            restart_delay: config.restart_delay,
            cancel,
        }
    }

    /// Follow the source until cancellation or permanent unavailability.
    pub async fn run(mut self, source: Arc<dyn LogSource>) {
        info!(source = %self.source_id, "monitoring source");

        while !self.cancel.is_cancelled() {
            let mut stream = match source.open(&self.source_id).await {
                Ok(stream) => stream,
                Err(SourceError::Unavailable(e)) => {
                    error!(
                        source = %self.source_id,
                        "log source unavailable, stopped monitoring this source: {e}"
                    );
                    return;
                }
                Err(SourceError::Io(e)) => {
                    warn!(source = %self.source_id, "failed to open log stream: {e}");
                    if self.pause().await {
                        return;
                    }
                    continue;
                }
            };

            self.follow(stream.as_mut()).await;

            // The buffered traceback belongs to the session that just ended;
            // a restarted stream starts clean.
            if let Some(event) = self.classifier.finish() {
                self.queue.try_enqueue(event);
            }

            if self.cancel.is_cancelled() {
                stream.shutdown().await;
                return;
            }

            warn!(source = %self.source_id, "log stream ended, restarting");
            if self.pause().await {
                stream.shutdown().await;
                return;
            }
        }
    }

    async fn follow(&mut self, stream: &mut dyn LineStream) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                line = stream.next_line() => match line {
                    Ok(Some(line)) => {
                        for event in self.classifier.push_line(&line) {
                            self.queue.try_enqueue(event);
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        warn!(source = %self.source_id, "error reading log stream: {e}");
                        return;
                    }
                },
            }
        }
    }

    /// Cancellable restart delay; true when cancelled during the wait.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(self.restart_delay) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;
    use crate::queue::{self, EventReceiver, QueueItem, RecvOutcome};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    /// A source that replays scripted line sessions, one per `open` call.
    struct ScriptedSource {
        sessions: Mutex<VecDeque<Vec<String>>>,
        exhausted: Exhausted,
    }

    /// What `open` does once every scripted session has been handed out.
    enum Exhausted {
        /// Return a stream that never yields; the reader parks on it.
        Hang,
        /// Report the source mechanism as gone.
        Unavailable,
    }

    impl ScriptedSource {
        fn new(sessions: Vec<Vec<&str>>, exhausted: Exhausted) -> Arc<Self> {
            Arc::new(ScriptedSource {
                sessions: Mutex::new(
                    sessions
                        .into_iter()
                        .map(|lines| lines.into_iter().map(String::from).collect())
                        .collect(),
                ),
                exhausted,
            })
        }
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn open(&self, _source_id: &str) -> Result<Box<dyn LineStream>, SourceError> {
            let session = self.sessions.lock().unwrap().pop_front();
            match session {
                Some(lines) => Ok(Box::new(ScriptedStream {
                    lines: lines.into(),
                    hang_at_end: false,
                })),
                None => match self.exhausted {
                    Exhausted::Hang => Ok(Box::new(ScriptedStream {
                        lines: VecDeque::new(),
                        hang_at_end: true,
                    })),
                    Exhausted::Unavailable => Err(SourceError::Unavailable(io::Error::new(
                        io::ErrorKind::NotFound,
                        "no such binary",
                    ))),
                },
            }
        }
    }

    struct ScriptedStream {
        lines: VecDeque<String>,
        hang_at_end: bool,
    }

    #[async_trait]
    impl LineStream for ScriptedStream {
        async fn next_line(&mut self) -> io::Result<Option<String>> {
            match self.lines.pop_front() {
                Some(line) => Ok(Some(line)),
                None if self.hang_at_end => std::future::pending().await,
                None => Ok(None),
            }
        }
    }

    fn test_setup(restart_delay: Duration) -> (Config, SourceReader, EventReceiver, CancellationToken) {
        let config = Config {
            sources: vec!["web-1".to_string()],
            restart_delay,
            ..Default::default()
        };
        let patterns = LinePatterns::compile(&config).unwrap();
        let (queue, rx) = queue::bounded(64);
        let cancel = CancellationToken::new();
        let reader = SourceReader::new(&config, patterns, "web-1", queue, cancel.clone());
        (config, reader, rx, cancel)
    }

    async fn next_event(rx: &mut EventReceiver) -> crate::event::LogEvent {
        match rx.recv(Duration::from_secs(1)).await {
            RecvOutcome::Item(QueueItem::Event(event)) => event,
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lines_are_classified_and_enqueued() {
        let (_config, reader, mut rx, cancel) = test_setup(Duration::from_millis(10));
        let source = ScriptedSource::new(
            vec![vec!["INFO fine", "ERROR boom", "INFO still fine"]],
            Exhausted::Hang,
        );
        let task = tokio::spawn(reader.run(source));

        let event = next_event(&mut rx).await;
        assert_eq!(event.severity, Severity::Error);
        assert_eq!(event.log, "ERROR boom");
        assert_eq!(event.source, "web-1");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_end_flushes_open_traceback() {
        let (_config, reader, mut rx, cancel) = test_setup(Duration::from_millis(10));
        let source = ScriptedSource::new(
            vec![vec![
                "Traceback (most recent call last):",
                "  File x",
                "ValueError: bad",
            ]],
            Exhausted::Hang,
        );
        let task = tokio::spawn(reader.run(source));

        let event = next_event(&mut rx).await;
        assert_eq!(event.severity, Severity::Fatal);
        assert_eq!(
            event.log,
            "Traceback (most recent call last):\n  File x\nValueError: bad"
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_restarts_ended_streams() {
        let (_config, reader, mut rx, cancel) = test_setup(Duration::from_millis(10));
        let source = ScriptedSource::new(
            vec![vec!["ERROR first session"], vec!["ERROR second session"]],
            Exhausted::Hang,
        );
        let task = tokio::spawn(reader.run(source));

        assert_eq!(next_event(&mut rx).await.log, "ERROR first session");
        assert_eq!(next_event(&mut rx).await.log, "ERROR second session");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_source_stops_reader() {
        let (_config, reader, _rx, _cancel) = test_setup(Duration::from_millis(10));
        let source = ScriptedSource::new(vec![], Exhausted::Unavailable);

        // The reader returns on its own, without cancellation.
        tokio::time::timeout(Duration::from_secs(1), reader.run(source))
            .await
            .expect("reader must stop on an unavailable source");
    }

    #[tokio::test]
    async fn test_cancellation_stops_parked_reader() {
        let (_config, reader, _rx, cancel) = test_setup(Duration::from_secs(60));
        let source = ScriptedSource::new(vec![], Exhausted::Hang);
        let task = tokio::spawn(reader.run(source));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reader must observe cancellation")
            .unwrap();
    }
}
