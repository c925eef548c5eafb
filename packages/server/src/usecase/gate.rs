//! Connection gate: admission into the wait pool, login and departure.

use crate::domain::{
    AccountId, AuthError, ConnectionHandle, ConnectionId, PoolFull, SlotRef,
    connection::CLOSE_TRY_AGAIN_LATER,
    messages::{LOGIN, LOGIN_SCHEMA, LoginPayload},
    schema::validate_as,
};
use crate::infrastructure::dto::websocket::{InboundEnvelope, ServerEvent};

use super::{
    error::GateError,
    lobby::{Lobby, LoginAttempt, Phase, Route, send_event},
};

impl Lobby {
    /// Reserve a waiting slot for a freshly accepted connection.
    ///
    /// When the wait pool is full the connection is closed with 1013 and never
    /// enters the lobby.
    pub fn accept(&mut self, connection: ConnectionHandle, now: i64) -> Result<SlotRef, GateError> {
        let connection_id = connection.id();
        match self.wait_pool.reserve(connection, now) {
            Ok(slot) => {
                self.routes.insert(connection_id, Route::Waiting(slot));
                tracing::info!(
                    "Connection '{}' waiting in slot {} ({}/{})",
                    connection_id,
                    slot.index,
                    self.wait_pool.active_count(),
                    self.wait_pool.capacity()
                );
                Ok(slot)
            }
            Err(PoolFull { pool, connection }) => {
                tracing::warn!("Refusing connection '{}': {} has no free slot", connection_id, pool);
                connection.close(CLOSE_TRY_AGAIN_LATER, "capacity exceeded");
                Err(GateError::WaitPoolFull)
            }
        }
    }

    /// Route one inbound text frame.
    ///
    /// Returns a [`LoginAttempt`] when a waiting connection sent a valid login;
    /// the caller resolves its token and reports back via [`Lobby::complete_login`].
    pub fn handle_inbound(
        &mut self,
        connection_id: ConnectionId,
        text: &str,
        now: i64,
    ) -> Option<LoginAttempt> {
        let Some(phase) = self.phase(connection_id) else {
            tracing::debug!("Dropping frame from unknown connection '{}'", connection_id);
            return None;
        };
        let envelope = match InboundEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.protocol_violation(connection_id, &format!("malformed frame: {e}"));
                return None;
            }
        };

        match phase {
            Phase::Waiting(slot) if envelope.event == LOGIN => {
                self.handle_login(connection_id, slot, &envelope)
            }
            Phase::Waiting(_) => {
                self.protocol_violation(
                    connection_id,
                    &format!("'{}' is not allowed before login", envelope.event),
                );
                None
            }
            Phase::Session(slot) => {
                self.handle_session_message(connection_id, slot, &envelope, now);
                None
            }
            Phase::Rejected => {
                self.protocol_violation(connection_id, "login was rejected");
                None
            }
        }
    }

    /// Binary frames are not part of the protocol
    pub fn reject_binary(&self, connection_id: ConnectionId) {
        if self.phase(connection_id).is_some() {
            self.protocol_violation(connection_id, "binary frames are not supported");
        }
    }

    fn handle_login(
        &mut self,
        connection_id: ConnectionId,
        slot: SlotRef,
        envelope: &InboundEnvelope,
    ) -> Option<LoginAttempt> {
        let payload: LoginPayload = match validate_as(&LOGIN_SCHEMA, &envelope.data) {
            Ok(payload) => payload,
            Err(e) => {
                self.protocol_violation(connection_id, &e.to_string());
                return None;
            }
        };
        if let Err(e) = self.wait_pool.record_login_attempt(slot) {
            self.protocol_violation(connection_id, &format!("login already in progress ({e})"));
            return None;
        }

        tracing::debug!("Connection '{}' submitted a login", connection_id);
        self.send(connection_id, &ServerEvent::LoginPending);
        Some(LoginAttempt {
            connection_id,
            slot,
            token: payload.token,
        })
    }

    /// Apply the outcome of an auth lookup.
    ///
    /// Results for connections that disconnected or were evicted meanwhile are
    /// discarded. Lookup failures are treated as a rejection; a rejected
    /// connection stays open until the rejected linger after `now` runs out.
    pub fn complete_login(
        &mut self,
        attempt: &LoginAttempt,
        outcome: Result<Option<AccountId>, AuthError>,
        now: i64,
    ) {
        if self.phase(attempt.connection_id) != Some(Phase::Waiting(attempt.slot)) {
            tracing::debug!(
                "Discarding auth result for '{}': slot no longer held",
                attempt.connection_id
            );
            return;
        }

        let account_id = match outcome {
            Ok(Some(account_id)) => account_id,
            Ok(None) => {
                tracing::info!("Login rejected for '{}': unknown token", attempt.connection_id);
                self.reject_login(attempt, "invalid or expired token", now);
                return;
            }
            Err(e) => {
                tracing::error!("Auth lookup failed for '{}': {}", attempt.connection_id, e);
                self.reject_login(attempt, "authentication unavailable", now);
                return;
            }
        };

        match self.wait_pool.mark_ready(attempt.slot, &account_id) {
            Ok(()) => tracing::info!(
                "Connection '{}' authenticated as '{}'",
                attempt.connection_id,
                account_id
            ),
            Err(e) => tracing::warn!("Cannot mark '{}' ready: {}", attempt.connection_id, e),
        }
    }

    fn reject_login(&mut self, attempt: &LoginAttempt, reason: &str, now: i64) {
        match self.wait_pool.mark_rejected(attempt.slot) {
            Ok(connection) => {
                send_event(
                    &connection,
                    &ServerEvent::LoginRejected {
                        reason: reason.to_string(),
                    },
                );
                self.routes.insert(
                    attempt.connection_id,
                    Route::Rejected {
                        connection,
                        since: now,
                    },
                );
            }
            Err(e) => tracing::warn!("Cannot reject '{}': {}", attempt.connection_id, e),
        }
    }

    /// Forget a closed connection. Returns `false` if it was already gone.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> bool {
        let Some(route) = self.routes.remove(&connection_id) else {
            return false;
        };

        match route {
            Route::Waiting(slot) => {
                self.wait_pool.release(slot);
                tracing::info!("Waiting connection '{}' left slot {}", connection_id, slot.index);
            }
            Route::Session(slot) => {
                if let Some(vacated) = self.sessions.vacate(slot) {
                    tracing::info!(
                        "'{}' left the lobby (seat {})",
                        vacated.account_id,
                        vacated.local_index
                    );
                    self.announce_departure(&vacated);
                }
            }
            Route::Rejected { .. } => {
                tracing::debug!("Rejected connection '{}' closed", connection_id);
            }
        }
        true
    }
}
