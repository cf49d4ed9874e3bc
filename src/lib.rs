//! slimclaw — LLM inference-optimization proxy.
//!
//! Reshapes a conversation to cut token cost (windowing + heuristic
//! summarization + cache-breakpoint annotation), classifies request
//! complexity, routes to a downstream model under budget/confidence
//! constraints, and forwards the request — streaming through — to the
//! resolved provider. Exposed to a host agent runtime as a local HTTP
//! sidecar presenting a virtual model catalogue.
//!
//! ## Quick start
//!
//! ```bash
//! # Run the sidecar on an OS-assigned port
//! slimclaw serve --port 0
//!
//! # Print the aggregated status block
//! slimclaw status
//! ```

pub mod caching;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod estimator;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod routing;
pub mod sidecar;
pub mod windowing;

pub use error::{ErrorCode, SlimClawError};

/// Version information, surfaced by the `status` CLI subcommand.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
