//! Connection profiles.
//!
//! A profile is a saved endpoint plus credentials, looked up by id before
//! connecting. Storage is behind [`ProfileStore`] so apps can back it with
//! whatever secure storage the platform offers.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ErrorKind;
use crate::transport::{ConnectionConfig, EndpointError};

/// Errors while resolving a profile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// No profile has this id.
    #[error("profile not found: {0}")]
    NotFound(String),

    /// The profile cannot be turned into a connection config.
    #[error("profile {id} is invalid")]
    Invalid {
        /// Profile id.
        id: String,
        /// Underlying problem.
        #[source]
        source: EndpointError,
    },
}

impl ProfileError {
    /// Classify into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(id) => ErrorKind::NotFound {
                resource_type: "profile".to_string(),
                id: id.clone(),
            },
            Self::Invalid { source, .. } => source.kind(),
        }
    }
}

/// Saved connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Unique id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Base URL of the server (`https://…`).
    pub endpoint: String,
    /// Terminal session to attach to.
    pub session_id: String,
    /// Bearer token. Takes precedence over basic credentials.
    #[serde(default)]
    pub token: Option<String>,
    /// Basic-auth username.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionProfile {
    /// Build the connection config for this profile.
    pub fn to_config(&self) -> Result<ConnectionConfig, ProfileError> {
        ConnectionConfig::from_parts(
            &self.endpoint,
            self.session_id.clone(),
            self.token.clone(),
            self.username.clone(),
            self.password.clone(),
        )
        .map_err(|source| ProfileError::Invalid {
            id: self.id.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Source of saved profiles.
pub trait ProfileStore: Send + Sync {
    /// Profile with the given id.
    fn profile(&self, id: &str) -> Option<ConnectionProfile>;

    /// Ids of every saved profile.
    fn ids(&self) -> Vec<String>;
}

/// In-memory [`ProfileStore`].
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, ConnectionProfile>>,
}

impl MemoryProfileStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile.
    pub fn insert(&self, profile: ConnectionProfile) {
        self.profiles.write().insert(profile.id.clone(), profile);
    }

    /// Remove a profile.
    pub fn remove(&self, id: &str) -> Option<ConnectionProfile> {
        self.profiles.write().remove(id)
    }
}

impl FromIterator<ConnectionProfile> for MemoryProfileStore {
    fn from_iter<I: IntoIterator<Item = ConnectionProfile>>(iter: I) -> Self {
        let profiles = iter.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            profiles: RwLock::new(profiles),
        }
    }
}

impl ProfileStore for MemoryProfileStore {
    fn profile(&self, id: &str) -> Option<ConnectionProfile> {
        self.profiles.read().get(id).cloned()
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.profiles.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Look up a profile and build its connection config.
pub fn resolve_profile(store: &dyn ProfileStore, id: &str) -> Result<ConnectionConfig, ProfileError> {
    store
        .profile(id)
        .ok_or_else(|| ProfileError::NotFound(id.to_string()))?
        .to_config()
}
