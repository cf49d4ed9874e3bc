//! Configuration Module
//!
//! Handles the validated configuration record: types, defaults, and
//! TOML load/save helpers for standalone/binary use.

pub mod secrets;
mod types;

pub use secrets::SecretString;
pub use types::*;
