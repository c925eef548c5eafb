//! Lobby tuning knobs.

use std::time::Duration;

use thiserror::Error;

/// Waiting slots available to unauthenticated connections
pub const DEFAULT_WAIT_CAPACITY: usize = 100;
/// Lobby seats
pub const DEFAULT_LOBBY_CAPACITY: usize = 100;
/// Delay between the end of one admission tick and the start of the next
pub const DEFAULT_SCHEDULER_INTERVAL_MS: u64 = 500;
/// How long a connection may sit in the wait pool without logging in
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;
/// How long a chat bubble stays attached to a participant
pub const DEFAULT_CHAT_TTL_MS: u64 = 5_000;
/// How long a connection whose login was rejected stays open
pub const DEFAULT_REJECTED_LINGER_MS: u64 = 30_000;

/// Whole milliseconds in `duration`, saturating at `i64::MAX`
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validated lobby configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyConfig {
    pub wait_capacity: usize,
    pub lobby_capacity: usize,
    pub scheduler_interval: Duration,
    /// `None` disables stale-entry eviction
    pub wait_timeout: Option<Duration>,
    pub chat_ttl: Duration,
    /// Grace period before a rejected connection is closed
    pub rejected_linger: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            wait_capacity: DEFAULT_WAIT_CAPACITY,
            lobby_capacity: DEFAULT_LOBBY_CAPACITY,
            scheduler_interval: Duration::from_millis(DEFAULT_SCHEDULER_INTERVAL_MS),
            wait_timeout: Some(Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS)),
            chat_ttl: Duration::from_millis(DEFAULT_CHAT_TTL_MS),
            rejected_linger: Duration::from_millis(DEFAULT_REJECTED_LINGER_MS),
        }
    }
}

impl LobbyConfig {
    /// Build a config from raw millisecond values; a zero wait timeout disables eviction.
    pub fn new(
        wait_capacity: usize,
        lobby_capacity: usize,
        scheduler_interval_ms: u64,
        wait_timeout_ms: u64,
    ) -> Result<Self, ConfigError> {
        Self {
            wait_capacity,
            lobby_capacity,
            scheduler_interval: Duration::from_millis(scheduler_interval_ms),
            wait_timeout: (wait_timeout_ms > 0).then(|| Duration::from_millis(wait_timeout_ms)),
            ..Self::default()
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.wait_capacity == 0 {
            return Err(ConfigError::Zero("wait capacity"));
        }
        if self.lobby_capacity == 0 {
            return Err(ConfigError::Zero("lobby capacity"));
        }
        if self.scheduler_interval.is_zero() {
            return Err(ConfigError::Zero("scheduler interval"));
        }
        Ok(self)
    }
}
