//! Capture-to-cache point cloud pipeline.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `encoder`: depth+color grids → packed point buffers.
//! - `cache`: bounded FIFO frame cache shared with readers.
//! - `capture`: the single-producer capture loop.
//! - `server`: Actix Web facade over the cache.
//! - `pipeline`: orchestrates capture, facade, and shutdown.
//! - `batch`: offline capture-and-save driver.
//! - `telemetry`: tracing setup shared by the threads.

pub(crate) use batch::run as run_batch;
pub(crate) use config::{BatchConfig, ServeConfig};
pub(crate) use pipeline::run as run_stream;

mod batch;
mod cache;
mod capture;
pub(crate) mod config;
mod encoder;
mod pipeline;
mod server;
pub(crate) mod telemetry;
