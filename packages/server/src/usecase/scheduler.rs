//! Admission scheduler.
//!
//! Every tick first evicts waiting connections that never logged in and
//! closes rejected connections whose linger ran out, then moves `Ready` entries into free lobby seats in increasing wait-slot order.
//! Entries that do not fit stay `Ready` for a later tick. Ticks are
//! fixed-delay: the next one is scheduled only after the previous completed.

use std::time::Duration;

use crate::config::duration_millis;
use crate::domain::{ConnectionId, SlotRef, StageError, connection::CLOSE_LOGIN_TIMEOUT};
use crate::infrastructure::dto::websocket::ServerEvent;

use super::{
    dispatcher::LobbyHandle,
    error::PromotionError,
    lobby::{Lobby, Route, send_event},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Wait-pool indices promoted, in promotion order
    pub promoted: Vec<usize>,
    /// Ready entries refused because the account already holds a seat
    pub refused: usize,
    /// Ready entries left waiting for a free seat
    pub deferred: usize,
    /// Waiting or rejected connections closed for overstaying
    pub evicted: usize,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.refused == 0 && self.deferred == 0 && self.evicted == 0
    }
}

enum Promotion {
    Admitted,
    Duplicate,
}

impl Lobby {
    /// Run one admission pass at time `now`.
    ///
    /// The dispatcher owns the lobby and handles one event at a time, so a
    /// tick always starts from `Idle`.
    pub fn tick(&mut self, now: i64) -> TickReport {
        debug_assert_eq!(self.scheduler, SchedulerState::Idle, "admission ticks overlapped");
        self.scheduler = SchedulerState::Running;

        let mut report = TickReport {
            evicted: self.evict_stale(now) + self.evict_rejected(now),
            ..TickReport::default()
        };
        self.sessions.clear_expired_chat(now);

        let mut remaining = self.sessions.remaining_capacity();
        let ready: Vec<SlotRef> = self.wait_pool.scan_ready().collect();
        for slot in ready {
            if remaining == 0 {
                report.deferred += 1;
                continue;
            }
            match self.promote(slot, now) {
                Ok(Promotion::Admitted) => {
                    report.promoted.push(slot.index);
                    remaining -= 1;
                }
                Ok(Promotion::Duplicate) => report.refused += 1,
                Err(e) => {
                    tracing::warn!("Promotion of wait slot {} deferred: {}", slot.index, e);
                    report.deferred += 1;
                }
            }
        }

        self.scheduler = SchedulerState::Idle;
        report
    }

    fn promote(&mut self, slot: SlotRef, now: i64) -> Result<Promotion, PromotionError> {
        let entry = self
            .wait_pool
            .get(slot)
            .ok_or(StageError::Stale { index: slot.index })?;
        let account_id = entry.account_id().to_string();
        let Some(connection_id) = entry.connection().map(|c| c.id()) else {
            return Err(StageError::Stale { index: slot.index }.into());
        };

        if self.sessions.contains_account(&account_id) {
            tracing::info!("'{}' already holds a seat, refusing '{}'", account_id, connection_id);
            if let Some(connection) = self.wait_pool.release(slot) {
                send_event(
                    &connection,
                    &ServerEvent::LoginRejected {
                        reason: "account already in lobby".to_string(),
                    },
                );
                self.routes.insert(
                    connection_id,
                    Route::Rejected {
                        connection,
                        since: now,
                    },
                );
            }
            return Ok(Promotion::Duplicate);
        }

        let sessions = &mut self.sessions;
        let seat = self
            .wait_pool
            .hand_over(slot, |account_id, connection| {
                sessions
                    .allocate(account_id, connection, now)
                    .map_err(|full| (full.pool, full.connection))
            })?
            .map_err(PromotionError::Full)?;

        self.routes.insert(connection_id, Route::Session(seat));
        tracing::info!(
            "'{}' admitted to seat {} ({}/{})",
            account_id,
            seat.index,
            self.sessions.occupied_count(),
            self.sessions.capacity()
        );
        self.welcome(seat);
        Ok(Promotion::Admitted)
    }

    /// Close `AwaitingLogin` connections older than the wait timeout.
    fn evict_stale(&mut self, now: i64) -> usize {
        let Some(timeout) = self.config.wait_timeout else {
            return 0;
        };
        let deadline = now.saturating_sub(duration_millis(timeout));
        let stale: Vec<SlotRef> = self.wait_pool.scan_stale(deadline).collect();

        let mut evicted = 0;
        for slot in stale {
            if let Some(connection) = self.wait_pool.release(slot) {
                tracing::info!("Evicting '{}' from wait slot {}: login timeout", connection.id(), slot.index);
                self.routes.remove(&connection.id());
                connection.close(CLOSE_LOGIN_TIMEOUT, "login timeout");
                evicted += 1;
            }
        }
        evicted
    }

    /// Close rejected connections held longer than the rejected linger.
    fn evict_rejected(&mut self, now: i64) -> usize {
        let deadline = now.saturating_sub(duration_millis(self.config.rejected_linger));
        let expired: Vec<ConnectionId> = self
            .routes
            .iter()
            .filter_map(|(id, route)| match route {
                Route::Rejected { since, .. } if *since < deadline => Some(*id),
                _ => None,
            })
            .collect();

        let mut evicted = 0;
        for connection_id in expired {
            if let Some(Route::Rejected { connection, .. }) = self.routes.remove(&connection_id) {
                tracing::info!("Closing rejected connection '{}'", connection_id);
                connection.close(CLOSE_LOGIN_TIMEOUT, "login rejected");
                evicted += 1;
            }
        }
        evicted
    }
}

/// Drive admission ticks until the dispatcher stops.
pub async fn run_admission_scheduler(lobby: LobbyHandle, interval: Duration) {
    tracing::info!("Admission scheduler started (interval {:?})", interval);
    loop {
        tokio::time::sleep(interval).await;
        match lobby.tick().await {
            Ok(report) if !report.is_empty() => tracing::debug!("Admission tick: {:?}", report),
            Ok(_) => {}
            Err(e) => {
                tracing::info!("Admission scheduler stopping: {}", e);
                break;
            }
        }
    }
}
