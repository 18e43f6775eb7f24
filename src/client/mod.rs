//! Tether - Connection Manager
//!
//! High-level API for one terminal session: connect, send input, observe
//! state and output, and recover from network loss automatically.

mod actor;
mod bootstrap;
#[allow(clippy::module_inception)]
mod client;

pub use bootstrap::*;
pub use client::*;
