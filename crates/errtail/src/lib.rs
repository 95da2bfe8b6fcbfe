//! # errtail
//!
//! A log-monitoring pipeline for containerized deployments: it follows the
//! live log streams of configured sources, classifies error lines and
//! multi-line tracebacks into structured events, and forwards them in
//! batches to a JSON log-ingestion endpoint.
//!
//! ## Architecture
//!
//! One task per source plus a single sender, joined by a bounded queue:
//! - [`source`]: the line-stream seam, backed by the docker CLI in production
//! - [`classifier`]: per-source line classification and traceback aggregation
//! - [`queue`]: bounded hand-off that sheds load instead of blocking readers
//! - [`sender`]: batch assembly and delivery with retry and backoff
//! - [`monitor`]: lifecycle wiring, startup gate, and coordinated shutdown
//!
//! Backpressure never reaches a monitored source: when the endpoint is slow
//! or down, events are dropped (and counted) rather than letting the queue
//! grow or readers stall.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod monitor;
pub mod probe;
pub mod queue;
pub mod reader;
pub mod sender;
pub mod source;

pub use config::Config;
pub use error::MonitorError;
pub use monitor::Monitor;
