//! Core types shared by every layer.
//!
//! Contains the error taxonomy, fault classification, the result envelope
//! returned by asynchronous operations, and the global error reporter. None
//! of these types perform I/O.

mod classify;
pub mod constants;
mod envelope;
mod error;
mod report;

pub use classify::*;
pub use envelope::*;
pub use error::*;
pub use report::*;
