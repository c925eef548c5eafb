//! UseCase layer: the admission pipeline.

pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod lobby;
pub mod scheduler;
pub mod session;

pub use dispatcher::{Dispatcher, InboundFrame, LobbyEvent, LobbyHandle, LobbyTasks, spawn_lobby};
pub use error::{GateError, LobbyError, PromotionError};
pub use lobby::{Lobby, LoginAttempt, Phase};
pub use scheduler::{SchedulerState, TickReport, run_admission_scheduler};
