//! Configuration for the coordinator and the relay transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable holding the relay server URL.
pub const RELAY_URL_ENV: &str = "GROUPDRAW_RELAY_URL";
/// Environment variable holding the room to join.
pub const ROOM_ENV: &str = "GROUPDRAW_ROOM";

/// Relay URL used when none is configured.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:3030/ws";
/// Room used when none is configured.
pub const DEFAULT_ROOM: &str = "lobby";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid WebSocket URL scheme: {0}")]
    InvalidScheme(String),
    #[error("Room name must not be empty")]
    EmptyRoom,
}

/// Tuning for [`crate::coordinator::SessionCoordinator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Capacity of the command queue between handles and the coordinator.
    pub command_capacity: usize,
    /// Forward the roster observed when a session activates, not only later
    /// changes. Keeps the participant count current; it never sends `Join`.
    pub report_initial_roster: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            report_initial_roster: true,
        }
    }
}

/// Where to find the relay server and which room to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub url: Url,
    pub room: String,
}

impl RelayConfig {
    /// Validate a relay URL and room.
    pub fn new(url: &str, room: impl Into<String>) -> Result<Self, ConfigError> {
        let url = Url::parse(url)?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::InvalidScheme(url.scheme().to_string()));
        }
        let room = room.into();
        if room.trim().is_empty() {
            return Err(ConfigError::EmptyRoom);
        }
        Ok(Self { url, room })
    }

    /// Read `GROUPDRAW_RELAY_URL` and `GROUPDRAW_ROOM`, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(RELAY_URL_ENV).unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string());
        let room = std::env::var(ROOM_ENV).unwrap_or_else(|_| DEFAULT_ROOM.to_string());
        Self::new(&url, room)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_RELAY_URL).expect("default relay URL is valid"),
            room: DEFAULT_ROOM.to_string(),
        }
    }
}
