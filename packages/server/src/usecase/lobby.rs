//! Lobby state owned by the dispatcher.
//!
//! [`Lobby`] holds the wait pool, the session table and the routing table
//! that says which of the two currently owns each live connection. All of
//! its methods are synchronous and run to completion; the dispatcher calls
//! them one event at a time. The operations are split by concern:
//! `gate.rs` (accept, login, disconnect), `scheduler.rs` (admission tick) and
//! `session.rs` (post-promotion messages).

use std::collections::HashMap;

use clubknight_shared::time::timestamp_to_rfc3339;

use crate::{
    config::LobbyConfig,
    domain::{
        ConnectionHandle, ConnectionId, SessionTable, SlotRef, Stage, WaitPool,
        connection::CLOSE_GOING_AWAY,
    },
    infrastructure::dto::{
        http::{LobbySnapshotDto, SessionSlotDto, WaitingEntryDto},
        websocket::ServerEvent,
    },
};

use super::scheduler::SchedulerState;

/// Which component currently owns a connection
#[derive(Debug)]
pub(super) enum Route {
    /// Held by a WaitPool entry
    Waiting(SlotRef),
    /// Held by a SessionTable slot
    Session(SlotRef),
    /// Login failed; the handle is kept until `since` plus the rejected linger
    Rejected {
        connection: ConnectionHandle,
        since: i64,
    },
}

/// Copyable view of a [`Route`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting(SlotRef),
    Session(SlotRef),
    Rejected,
}

/// Login that passed validation and awaits the auth lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub connection_id: ConnectionId,
    pub slot: SlotRef,
    pub token: String,
}

/// Admission pipeline state
#[derive(Debug)]
pub struct Lobby {
    pub(super) config: LobbyConfig,
    pub(super) wait_pool: WaitPool,
    pub(super) sessions: SessionTable,
    pub(super) routes: HashMap<ConnectionId, Route>,
    pub(super) scheduler: SchedulerState,
}

impl Lobby {
    pub fn new(config: LobbyConfig) -> Self {
        Self {
            wait_pool: WaitPool::new(config.wait_capacity),
            sessions: SessionTable::new(config.lobby_capacity),
            routes: HashMap::new(),
            scheduler: SchedulerState::Idle,
            config,
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    pub fn wait_pool(&self) -> &WaitPool {
        &self.wait_pool
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler
    }

    pub fn phase(&self, connection_id: ConnectionId) -> Option<Phase> {
        self.routes.get(&connection_id).map(|route| match route {
            Route::Waiting(slot) => Phase::Waiting(*slot),
            Route::Session(slot) => Phase::Session(*slot),
            Route::Rejected { .. } => Phase::Rejected,
        })
    }

    /// Stage of the connection's waiting entry, if it still has one
    pub fn stage_of(&self, connection_id: ConnectionId) -> Option<Stage> {
        match self.phase(connection_id)? {
            Phase::Waiting(slot) => self.wait_pool.get(slot).map(|e| e.stage()),
            _ => None,
        }
    }

    pub(super) fn connection(&self, connection_id: ConnectionId) -> Option<&ConnectionHandle> {
        match self.routes.get(&connection_id)? {
            Route::Waiting(slot) => self.wait_pool.get(*slot)?.connection(),
            Route::Session(slot) => self.sessions.get(*slot)?.connection(),
            Route::Rejected { connection, .. } => Some(connection),
        }
    }

    pub(super) fn send(&self, connection_id: ConnectionId, event: &ServerEvent) {
        match self.connection(connection_id) {
            Some(connection) => send_event(connection, event),
            None => tracing::debug!("No live connection '{}' to send to", connection_id),
        }
    }

    /// Tell the client its message was refused. The connection stays open.
    pub(super) fn protocol_violation(&self, connection_id: ConnectionId, reason: &str) {
        tracing::warn!("Protocol violation from '{}': {}", connection_id, reason);
        self.send(
            connection_id,
            &ServerEvent::Error {
                reason: reason.to_string(),
            },
        );
    }

    /// Close every connection the lobby still knows about
    pub fn close_all(&self) {
        for connection_id in self.routes.keys() {
            if let Some(connection) = self.connection(*connection_id) {
                connection.close(CLOSE_GOING_AWAY, "server shutting down");
            }
        }
    }

    pub fn snapshot(&self) -> LobbySnapshotDto {
        LobbySnapshotDto {
            wait_capacity: self.wait_pool.capacity(),
            lobby_capacity: self.sessions.capacity(),
            waiting: self
                .wait_pool
                .entries()
                .filter(|(_, entry)| entry.stage() != Stage::Inactive)
                .map(|(index, entry)| WaitingEntryDto {
                    index,
                    stage: entry.stage(),
                    account_id: entry.account_id().to_string(),
                    entered_at: timestamp_to_rfc3339(entry.entered_at()),
                })
                .collect(),
            players: self
                .sessions
                .occupied()
                .map(|(slot, session)| SessionSlotDto {
                    local_index: slot.index,
                    account_id: session.account_id().to_string(),
                    joined_at: timestamp_to_rfc3339(session.joined_at()),
                    presence: session.presence().clone(),
                })
                .collect(),
        }
    }
}

/// Serialize and queue `event`; failures are logged, never raised.
pub(super) fn send_event(connection: &ConnectionHandle, event: &ServerEvent) {
    let text = match event.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode {:?}: {}", event, e);
            return;
        }
    };
    if let Err(e) = connection.push(text) {
        tracing::debug!("{}", e);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::sync::mpsc;

    use crate::{
        config::LobbyConfig,
        domain::{ConnectionHandle, ConnectionId, Outbound},
        infrastructure::dto::websocket::ServerEvent,
    };

    use super::Lobby;

    pub fn lobby(wait_capacity: usize, lobby_capacity: usize) -> Lobby {
        Lobby::new(LobbyConfig {
            wait_capacity,
            lobby_capacity,
            ..LobbyConfig::default()
        })
    }

    pub fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(ConnectionId::generate(), tx), rx)
    }

    /// Drain everything queued for a connection
    pub fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    /// Drain and decode the queued text frames
    pub fn events(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<ServerEvent> {
        drain(rx)
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Text(text) => serde_json::from_str(&text).ok(),
                Outbound::Close { .. } => None,
            })
            .collect()
    }

    pub fn login_frame(token: &str) -> String {
        serde_json::json!({"event": "login", "data": {"token": token}}).to_string()
    }
}
