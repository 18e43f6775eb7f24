//! Fault classification.
//!
//! [`classify`] maps any fault to exactly one [`ErrorKind`]. The match is
//! total and order-sensitive:
//!
//! 1. An [`ErrorKind`] anywhere in the chain is passed through unchanged.
//! 2. Transport and OS faults ([`TransportError`], `std::io::Error`,
//!    `tokio::time::error::Elapsed`, WebSocket errors).
//! 3. Faults carrying an HTTP-like status ([`StatusFault`], rejected upgrade
//!    responses).
//! 4. Decoding faults (`serde_json::Error`) become `Validation`.
//! 5. Anything else is `Unknown`.

use std::io;

use thiserror::Error;

use super::error::ErrorKind;
use crate::transport::{EndpointError, TransportError};

/// A fault carrying an HTTP-like status code.
///
/// Raised by REST collaborators so their failures classify the same way as
/// transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("request failed with status {status}")]
pub struct StatusFault {
    /// Status code.
    pub status: u16,
    /// Response detail text, if any.
    pub details: Option<String>,
    /// Resource kind and id, used when the status is 404.
    pub resource: Option<(String, String)>,
}

impl StatusFault {
    /// Create a fault for the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            details: None,
            resource: None,
        }
    }

    /// Attach response detail text.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach the resource that was requested.
    pub fn for_resource(mut self, resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource = Some((resource_type.into(), id.into()));
        self
    }

    /// Classify this status.
    pub fn kind(&self) -> ErrorKind {
        match (&self.resource, self.status) {
            (Some((resource_type, id)), 404) => ErrorKind::NotFound {
                resource_type: resource_type.clone(),
                id: id.clone(),
            },
            _ => ErrorKind::from_status(self.status, self.details.clone()),
        }
    }
}

/// Classify an arbitrary fault.
pub fn classify(fault: &anyhow::Error) -> ErrorKind {
    if let Some(kind) = fault.chain().find_map(|e| e.downcast_ref::<ErrorKind>()) {
        return kind.clone();
    }

    if let Some(kind) = fault.chain().find_map(classify_transport) {
        return kind;
    }

    if let Some(kind) = fault.chain().find_map(classify_status) {
        return kind;
    }

    if fault
        .chain()
        .any(|e| e.downcast_ref::<serde_json::Error>().is_some())
    {
        return ErrorKind::Validation { field: None };
    }

    ErrorKind::Unknown
}

/// Classify a standalone I/O error.
pub fn classify_io(error: &io::Error) -> ErrorKind {
    if is_resolution_failure(error) {
        return ErrorKind::no_connection();
    }
    match error.kind() {
        io::ErrorKind::TimedOut => ErrorKind::timeout(),
        io::ErrorKind::NotConnected
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::NetworkDown
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::AddrNotAvailable => ErrorKind::no_connection(),
        _ => ErrorKind::network(),
    }
}

/// Whether an I/O error is a host-name resolution failure.
///
/// Resolver failures surface as uncategorised I/O errors, so the message is
/// the only signal available.
pub fn is_resolution_failure(error: &io::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("failed to lookup address")
        || message.contains("name or service not known")
        || message.contains("nodename nor servname")
        || message.contains("no such host")
        || message.contains("temporary failure in name resolution")
}

fn classify_transport(error: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    if let Some(e) = error.downcast_ref::<TransportError>() {
        return Some(e.kind());
    }
    if let Some(e) = error.downcast_ref::<EndpointError>() {
        return Some(e.kind());
    }
    if let Some(e) = error.downcast_ref::<io::Error>() {
        return Some(classify_io(e));
    }
    if error.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return Some(ErrorKind::timeout());
    }
    #[cfg(feature = "websocket")]
    if let Some(e) = error.downcast_ref::<tokio_tungstenite::tungstenite::Error>() {
        return Some(crate::transport::map_handshake_error(e, "").kind());
    }
    #[cfg(feature = "client")]
    if let Some(e) = error.downcast_ref::<crate::client::ProfileError>() {
        return Some(e.kind());
    }
    None
}

fn classify_status(error: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    error.downcast_ref::<StatusFault>().map(StatusFault::kind)
}
