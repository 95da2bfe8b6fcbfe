//! The external log source seam.
//!
//! A [`LogSource`] hands out live line streams for a source id. The
//! production implementation shells out to `docker logs -f`; tests inject
//! scripted fakes. Opening a stream can fail permanently (the mechanism
//! itself is missing) or transiently (anything else); streams can end at any
//! time and the reader restarts them.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

/// How long to wait for a killed child before abandoning it to the
/// kill-on-drop reaper.
const KILL_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The mechanism to read this source's logs is categorically unavailable;
    /// the reader stops monitoring the source permanently.
    #[error("log source mechanism unavailable: {0}")]
    Unavailable(#[source] io::Error),

    /// Transient failure; the reader retries after its restart delay.
    #[error("failed to open log stream: {0}")]
    Io(#[from] io::Error),
}

/// Yields live line streams for monitored sources.
#[async_trait]
pub trait LogSource: Send + Sync + 'static {
    async fn open(&self, source_id: &str) -> Result<Box<dyn LineStream>, SourceError>;
}

/// An open, ordered stream of log lines for one source.
#[async_trait]
pub trait LineStream: Send {
    /// Next line, `Ok(None)` at end of stream.
    async fn next_line(&mut self) -> io::Result<Option<String>>;

    /// Best-effort early termination of the underlying stream.
    async fn shutdown(&mut self) {}
}

/// Tails container logs via the docker CLI.
///
/// `--tail 0` streams only fresh output; a restarted stream never replays
/// backlog already seen (or deliberately skipped) in a previous session.
#[derive(Debug, Clone)]
pub struct DockerLogSource {
    binary: String,
}

impl Default for DockerLogSource {
    fn default() -> Self {
        DockerLogSource {
            binary: "docker".to_string(),
        }
    }
}

impl DockerLogSource {
    #[cfg(test)]
    fn with_binary(binary: &str) -> Self {
        DockerLogSource {
            binary: binary.to_string(),
        }
    }
}

#[async_trait]
impl LogSource for DockerLogSource {
    async fn open(&self, source_id: &str) -> Result<Box<dyn LineStream>, SourceError> {
        let mut child = Command::new(&self.binary)
            .args(["logs", "-f", "--tail", "0", source_id])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    SourceError::Unavailable(e)
                } else {
                    SourceError::Io(e)
                }
            })?;

        // docker writes the container's stderr to its own stderr; both pipes
        // feed one merged line stream.
        let stdout = child.stdout.take().map(|out| BufReader::new(out).lines());
        let stderr = child.stderr.take().map(|err| BufReader::new(err).lines());

        Ok(Box::new(DockerLineStream {
            child,
            stdout,
            stderr,
        }))
    }
}

struct DockerLineStream {
    child: Child,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
}

enum Pipe {
    Out(Option<String>),
    Err(Option<String>),
}

#[async_trait]
impl LineStream for DockerLineStream {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let next = match (self.stdout.as_mut(), self.stderr.as_mut()) {
                (Some(out), Some(err)) => tokio::select! {
                    line = out.next_line() => Pipe::Out(line?),
                    line = err.next_line() => Pipe::Err(line?),
                },
                (Some(out), None) => Pipe::Out(out.next_line().await?),
                (None, Some(err)) => Pipe::Err(err.next_line().await?),
                (None, None) => return Ok(None),
            };

            match next {
                Pipe::Out(Some(line)) | Pipe::Err(Some(line)) => return Ok(Some(line)),
                Pipe::Out(None) => self.stdout = None,
                Pipe::Err(None) => self.stderr = None,
            }
        }
    }

    async fn shutdown(&mut self) {
        // Already-exited children make start_kill fail; nothing to do then.
        if self.child.start_kill().is_err() {
            return;
        }
        match tokio::time::timeout(KILL_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "log stream child terminated"),
            Ok(Err(e)) => debug!("failed reaping log stream child: {e}"),
            Err(_) => warn!("log stream child did not exit in time; abandoning it"),
        }
    }
}
