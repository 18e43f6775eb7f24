//! Error taxonomy.
//!
//! Every fault surfaced to callers is one of the [`ErrorKind`] variants. Each
//! kind carries a fixed user-facing message, a recoverability flag and a
//! [`SuggestedAction`] for UI affordances.

use std::borrow::Cow;

use thiserror::Error;

/// Closed set of error kinds surfaced by the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level failure.
    #[error("network error (no_connection: {no_connection}, timeout: {timeout})")]
    Network {
        /// The device has no usable network path.
        no_connection: bool,
        /// The operation ran out of time.
        timeout: bool,
    },

    /// Credentials were rejected.
    #[error("authentication failed (HTTP {code})")]
    Auth {
        /// Status code reported by the server (401 or 403).
        code: u16,
    },

    /// The server failed to handle the request.
    #[error("server error (HTTP {code})")]
    Server {
        /// Status code reported by the server.
        code: u16,
    },

    /// The server answered with a status outside the other categories.
    #[error("api error (HTTP {code}): {}", .details.as_deref().unwrap_or("no details"))]
    ApiError {
        /// Status code reported by the server.
        code: u16,
        /// Optional detail text from the response.
        details: Option<String>,
    },

    /// The persistent transport was closed.
    #[error("transport closed (can_reconnect: {can_reconnect})")]
    TransportClosed {
        /// Whether reconnecting may succeed.
        can_reconnect: bool,
    },

    /// Local storage failed.
    #[error("storage error")]
    Storage,

    /// A remote resource does not exist.
    #[error("{resource_type} not found: {id}")]
    NotFound {
        /// Kind of resource (e.g. "terminal session").
        resource_type: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// Input was rejected.
    #[error("validation failed{}", .field.as_deref().map(|f| format!(" on `{f}`")).unwrap_or_default())]
    Validation {
        /// Offending field, when known.
        field: Option<String>,
    },

    /// Catch-all for faults that match nothing else.
    #[error("unknown error")]
    Unknown,
}

/// UI affordance suggested for an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuggestedAction {
    /// Offer to run the same operation again.
    Retry,
    /// Offer to re-open the persistent connection.
    Reconnect,
    /// Prompt for new credentials.
    ReAuthenticate,
    /// Navigate away from the missing resource.
    GoBack,
    /// Ask the user to correct their input.
    FixInput,
    /// Show a single acknowledgement.
    Dismiss,
}

impl ErrorKind {
    /// Network failure caused by the device being offline.
    pub fn no_connection() -> Self {
        Self::Network {
            no_connection: true,
            timeout: false,
        }
    }

    /// Network failure caused by a timeout.
    pub fn timeout() -> Self {
        Self::Network {
            no_connection: false,
            timeout: true,
        }
    }

    /// Generic network failure.
    pub fn network() -> Self {
        Self::Network {
            no_connection: false,
            timeout: false,
        }
    }

    /// Map an HTTP-like status code to a kind.
    ///
    /// 401/403 → `Auth`, 404 → `NotFound`, 400/422 → `Validation`,
    /// 5xx → `Server`, everything else → `ApiError`.
    pub fn from_status(code: u16, details: Option<String>) -> Self {
        match code {
            401 | 403 => Self::Auth { code },
            404 => Self::NotFound {
                resource_type: "resource".to_string(),
                id: details.unwrap_or_default(),
            },
            400 | 422 => Self::Validation { field: details },
            500..=599 => Self::Server { code },
            _ => Self::ApiError { code, details },
        }
    }

    /// Fixed message shown to the user for this kind.
    pub fn user_message(&self) -> Cow<'static, str> {
        match self {
            Self::Network {
                no_connection: true,
                ..
            } => "No internet connection. Check your network and try again.".into(),
            Self::Network { timeout: true, .. } => {
                "The server took too long to respond. Please try again.".into()
            }
            Self::Network { .. } => "A network error occurred. Please try again.".into(),
            Self::Auth { .. } => "Your credentials were rejected. Please sign in again.".into(),
            Self::Server { .. } => {
                "The server encountered an error. Please try again later.".into()
            }
            Self::ApiError { code: 429, .. } => {
                "Too many requests. Please wait a moment and try again.".into()
            }
            Self::ApiError { .. } => "The request could not be completed.".into(),
            Self::TransportClosed {
                can_reconnect: true,
            } => "The connection was closed. Reconnect to continue.".into(),
            Self::TransportClosed {
                can_reconnect: false,
            } => "The session has ended.".into(),
            Self::Storage => "Local storage is unavailable.".into(),
            Self::NotFound { resource_type, .. } => {
                format!("The requested {resource_type} could not be found.").into()
            }
            Self::Validation { .. } => "Some of the provided input is invalid.".into(),
            Self::Unknown => "Something went wrong.".into(),
        }
    }

    /// Whether retrying the operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Server { .. } => true,
            Self::ApiError { code, .. } => matches!(code, 408 | 429),
            Self::TransportClosed { can_reconnect } => *can_reconnect,
            Self::Auth { .. }
            | Self::Storage
            | Self::NotFound { .. }
            | Self::Validation { .. }
            | Self::Unknown => false,
        }
    }

    /// Action the UI should offer for this kind.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Self::Network { .. } | Self::Server { .. } => SuggestedAction::Retry,
            Self::ApiError { .. } if self.is_recoverable() => SuggestedAction::Retry,
            Self::ApiError { .. } => SuggestedAction::Dismiss,
            Self::Auth { .. } => SuggestedAction::ReAuthenticate,
            Self::TransportClosed {
                can_reconnect: true,
            } => SuggestedAction::Reconnect,
            Self::TransportClosed {
                can_reconnect: false,
            } => SuggestedAction::GoBack,
            Self::NotFound { .. } => SuggestedAction::GoBack,
            Self::Validation { .. } => SuggestedAction::FixInput,
            Self::Storage | Self::Unknown => SuggestedAction::Dismiss,
        }
    }
}
