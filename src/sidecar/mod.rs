//! Streaming Sidecar — the HTTP surface that presents this crate as a
//! provider endpoint to the host agent runtime.

pub mod catalog;
pub mod forwarder;
pub mod server;

pub use forwarder::Forwarder;
pub use server::Sidecar;
