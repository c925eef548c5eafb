//! Domain layer: slot pools, message validation and collaborator interfaces.

pub mod auth;
pub mod connection;
pub mod error;
pub mod messages;
pub mod schema;
pub mod session_table;
pub mod wait_pool;

pub use auth::{AccountId, AuthLookup, resolve_token};
pub use connection::{ConnectionHandle, ConnectionId, Outbound, PusherChannel};
pub use error::{AuthError, MessagePushError, PoolFull, PoolKind, StageError};
pub use schema::{Kind, Schema, ValidationError};
pub use session_table::{ChatBubble, Presence, SessionSlot, SessionTable};
pub use wait_pool::{SlotRef, Stage, WaitEntry, WaitPool};
