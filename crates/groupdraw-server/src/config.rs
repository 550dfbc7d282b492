//! Server configuration from the environment.

use std::net::SocketAddr;
use thiserror::Error;

/// Environment variable holding the listen address.
pub const ADDR_ENV: &str = "GROUPDRAW_ADDR";
/// Environment variable holding the per-room broadcast capacity.
pub const ROOM_CAPACITY_ENV: &str = "GROUPDRAW_ROOM_CAPACITY";

pub const DEFAULT_ADDR: &str = "0.0.0.0:3030";
pub const DEFAULT_ROOM_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid listen address: {0}")]
    InvalidAddr(#[from] std::net::AddrParseError),
    #[error("Invalid room capacity: {0}")]
    InvalidCapacity(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Messages buffered per room before slow peers start lagging.
    pub room_capacity: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(
            std::env::var(ADDR_ENV).ok().as_deref(),
            std::env::var(ROOM_CAPACITY_ENV).ok().as_deref(),
        )
    }

    fn parse(addr: Option<&str>, capacity: Option<&str>) -> Result<Self, ConfigError> {
        let addr = addr.unwrap_or(DEFAULT_ADDR).parse()?;
        let room_capacity = match capacity {
            None => DEFAULT_ROOM_CAPACITY,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidCapacity(raw.to_string())),
            },
        };
        Ok(Self {
            addr,
            room_capacity,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            room_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}
