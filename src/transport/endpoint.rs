//! Connection configuration and endpoint URLs.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use url::Url;

use crate::core::ErrorKind;
use crate::core::constants::{TERMINAL_PATH_PREFIX, TERMINAL_PATH_SUFFIX};

/// Errors in a [`ConnectionConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The endpoint is not a valid URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint scheme is not http(s) or ws(s).
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Neither a token nor a username/password pair was given.
    #[error("no credentials provided")]
    MissingCredentials,

    /// The session id is empty.
    #[error("session id is empty")]
    EmptySessionId,

    /// The endpoint cannot carry a path (e.g. `mailto:`).
    #[error("endpoint cannot be used as a base URL")]
    CannotBeABase,
}

impl EndpointError {
    /// Classify into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        let field = match self {
            Self::InvalidUrl(_) | Self::UnsupportedScheme(_) | Self::CannotBeABase => "endpoint",
            Self::MissingCredentials => "credentials",
            Self::EmptySessionId => "session_id",
        };
        ErrorKind::Validation {
            field: Some(field.to_string()),
        }
    }
}

/// Credentials presented during the upgrade.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Bearer token.
    Token(String),
    /// HTTP basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl Credentials {
    /// Value of the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        match self {
            Self::Token(token) => format!("Bearer {token}"),
            Self::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Where and how to open a terminal session.
///
/// Immutable once built. Retained by the connection manager only for
/// automatic reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    endpoint: Url,
    session_id: String,
    credentials: Credentials,
}

impl ConnectionConfig {
    /// Create a config from a parsed endpoint.
    pub fn new(
        endpoint: Url,
        session_id: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self, EndpointError> {
        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return Err(EndpointError::EmptySessionId);
        }
        let config = Self {
            endpoint,
            session_id,
            credentials,
        };
        // Reject unusable endpoints up front.
        config.websocket_url()?;
        Ok(config)
    }

    /// Create a config from an endpoint string.
    pub fn parse(
        endpoint: &str,
        session_id: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self, EndpointError> {
        Self::new(Url::parse(endpoint)?, session_id, credentials)
    }

    /// Create a config from optional credential parts.
    ///
    /// A token takes precedence over a username/password pair.
    pub fn from_parts(
        endpoint: &str,
        session_id: impl Into<String>,
        token: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, EndpointError> {
        let credentials = match (token.filter(|t| !t.is_empty()), username, password) {
            (Some(token), _, _) => Credentials::Token(token),
            (None, Some(username), Some(password)) => Credentials::Basic { username, password },
            _ => return Err(EndpointError::MissingCredentials),
        };
        Self::parse(endpoint, session_id, credentials)
    }

    /// Base endpoint as given.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Terminal session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// WebSocket URL of the terminal resource.
    ///
    /// `http` maps to `ws` and `https` to `wss`; the path
    /// `/api/sessions/{session_id}/terminal` is appended to any base path.
    pub fn websocket_url(&self) -> Result<Url, EndpointError> {
        let scheme = match self.endpoint.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };

        let mut url = self.endpoint.clone();
        if url.scheme() != scheme {
            // http <-> ws swaps between special schemes and always succeeds.
            url.set_scheme(scheme)
                .map_err(|()| EndpointError::UnsupportedScheme(self.endpoint.scheme().to_string()))?;
        }
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| EndpointError::CannotBeABase)?
            .pop_if_empty()
            .extend(TERMINAL_PATH_PREFIX)
            .push(&self.session_id)
            .push(TERMINAL_PATH_SUFFIX);
        Ok(url)
    }
}
