//! Domain errors.

use thiserror::Error;

use super::{connection::ConnectionHandle, wait_pool::Stage};

/// Which fixed-size pool a slot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    WaitPool,
    SessionTable,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::WaitPool => f.write_str("wait pool"),
            PoolKind::SessionTable => f.write_str("session table"),
        }
    }
}

/// No free slot was left; the connection is handed back to the caller.
#[derive(Debug, Error)]
#[error("{pool} has no free slot")]
pub struct PoolFull {
    pub pool: PoolKind,
    pub connection: ConnectionHandle,
}

/// Stage transition errors on a WaitPool entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The slot reference outlived the reservation it was issued for
    #[error("slot {index} was released or reassigned")]
    Stale { index: usize },

    /// The entry is not in the stage the transition starts from
    #[error("slot {index} is in stage {actual:?}, expected {expected:?}")]
    Conflict {
        index: usize,
        expected: Stage,
        actual: Stage,
    },
}

/// Failures pushing a message to a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("connection '{0}' is no longer writable")]
    ChannelClosed(String),
}

/// Failures of the authentication collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("auth storage unavailable: {0}")]
    Unavailable(String),
}
