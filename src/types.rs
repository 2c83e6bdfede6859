// Validated Types
// Strongly-typed wrappers for the identifiers that key a sample.
// These types cannot be constructed with invalid data.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::identifier;

/// A room identifier that is guaranteed to be non-empty and bounded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatedRoomId {
    inner: String,
}

impl ValidatedRoomId {
    pub fn new(room_id: impl Into<String>) -> Result<Self> {
        let room_id = room_id.into();
        identifier::validate_identifier("room_id", &room_id)?;
        Ok(Self { inner: room_id })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn into_inner(self) -> String {
        self.inner
    }
}

impl fmt::Display for ValidatedRoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// The event id of a ping
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatedEventId {
    inner: String,
}

impl ValidatedEventId {
    pub fn new(event_id: impl Into<String>) -> Result<Self> {
        let event_id = event_id.into();
        identifier::validate_identifier("event_id", &event_id)?;
        Ok(Self { inner: event_id })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn into_inner(self) -> String {
        self.inner
    }
}

impl fmt::Display for ValidatedEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// Identity of a peer, typically a homeserver domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatedServerName {
    inner: String,
}

impl ValidatedServerName {
    /// # Invariants
    /// - Non-empty, at most 255 bytes
    /// - No whitespace or null bytes
    pub fn new(server_name: impl Into<String>) -> Result<Self> {
        let server_name = server_name.into();
        identifier::validate_server_name(&server_name)?;
        Ok(Self { inner: server_name })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn into_inner(self) -> String {
        self.inner
    }
}

impl fmt::Display for ValidatedServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// Derive the server name from a user id such as `@pingbot:example.org`
///
/// Everything after the first `:` is the server name, port included.
pub fn server_name_from_user_id(user_id: &str) -> Result<ValidatedServerName> {
    let (_, server) = user_id
        .split_once(':')
        .ok_or_else(|| anyhow!("User ID {user_id:?} has no server part"))?;
    ValidatedServerName::new(server)
}
