//! UseCase errors.

use thiserror::Error;

use crate::domain::{PoolKind, StageError};

/// Connection refused at the gate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("wait pool is full")]
    WaitPoolFull,
}

/// A Ready entry could not be moved into the session table this tick
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("{0} has no free slot")]
    Full(PoolKind),
}

/// The dispatcher task is gone
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("lobby dispatcher has stopped")]
    DispatcherStopped,
}
