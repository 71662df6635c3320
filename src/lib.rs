//! Patch Reporter library
//!
//! Runtime verification harness for client mod patches: forces the host
//! application to load every lazy chunk it owns, replays the patch system's
//! module searches, and reports whatever failed.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod harness;
pub mod host;
pub mod replay;
pub mod report;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use discovery::DiscoveryEngine;
pub use report::{Report, ReportAggregator};
