// Room disclaimers attached to statistics reports

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_DISCLAIMER: &str = "Latency is measured from the time the ping was sent \
until the pong was received, as reported by the responding server. Clock skew between \
servers affects the numbers.";

/// Lookup of the disclaimer text shown for a room
pub trait DisclaimerLookup: Send + Sync {
    fn disclaimer_for(&self, room_id: &str) -> &str;
}

/// Default text plus per-room overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclaimers {
    #[serde(default = "default_text")]
    pub default: String,
    #[serde(default)]
    pub rooms: HashMap<String, String>,
}

fn default_text() -> String {
    DEFAULT_DISCLAIMER.to_string()
}

impl Disclaimers {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            rooms: HashMap::new(),
        }
    }

    pub fn with_room(mut self, room_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.rooms.insert(room_id.into(), text.into());
        self
    }
}

impl Default for Disclaimers {
    fn default() -> Self {
        Self::new(DEFAULT_DISCLAIMER)
    }
}

impl DisclaimerLookup for Disclaimers {
    fn disclaimer_for(&self, room_id: &str) -> &str {
        self.rooms
            .get(room_id)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}
