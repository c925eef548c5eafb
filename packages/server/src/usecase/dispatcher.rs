//! Single-owner event loop for the lobby.
//!
//! Socket tasks, the admission scheduler and auth lookups never touch
//! [`Lobby`] directly; they send [`LobbyEvent`]s through a cloneable
//! [`LobbyHandle`] and the dispatcher applies them one at a time. Auth lookups
//! run as separate tasks so a slow store never blocks the loop.

use std::{collections::HashMap, ops::ControlFlow, sync::Arc};

use clubknight_shared::time::Clock;
use tokio::{
    sync::{mpsc, oneshot},
    task::{AbortHandle, JoinHandle},
};

use crate::{
    config::LobbyConfig,
    domain::{AccountId, AuthError, AuthLookup, ConnectionHandle, ConnectionId, resolve_token},
    infrastructure::dto::http::LobbySnapshotDto,
};

use super::{
    error::LobbyError,
    lobby::{Lobby, LoginAttempt},
    scheduler::{TickReport, run_admission_scheduler},
};

/// Payload of one inbound WebSocket data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary,
}

#[derive(Debug)]
pub enum LobbyEvent {
    Connect {
        connection: ConnectionHandle,
    },
    Inbound {
        connection_id: ConnectionId,
        frame: InboundFrame,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    AuthResolved {
        attempt: LoginAttempt,
        outcome: Result<Option<AccountId>, AuthError>,
    },
    Tick {
        done: oneshot::Sender<TickReport>,
    },
    Snapshot {
        reply: oneshot::Sender<LobbySnapshotDto>,
    },
    Shutdown,
}

/// Cloneable sender side of the dispatcher
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    events: mpsc::UnboundedSender<LobbyEvent>,
}

impl LobbyHandle {
    fn send(&self, event: LobbyEvent) -> Result<(), LobbyError> {
        self.events
            .send(event)
            .map_err(|_| LobbyError::DispatcherStopped)
    }

    /// Hand a new connection to the gate
    pub fn connect(&self, connection: ConnectionHandle) -> Result<(), LobbyError> {
        self.send(LobbyEvent::Connect { connection })
    }

    pub fn inbound(&self, connection_id: ConnectionId, frame: InboundFrame) -> Result<(), LobbyError> {
        self.send(LobbyEvent::Inbound {
            connection_id,
            frame,
        })
    }

    pub fn disconnect(&self, connection_id: ConnectionId) -> Result<(), LobbyError> {
        self.send(LobbyEvent::Disconnect { connection_id })
    }

    /// Run one admission tick and wait for it to finish
    pub async fn tick(&self) -> Result<TickReport, LobbyError> {
        let (done, report) = oneshot::channel();
        self.send(LobbyEvent::Tick { done })?;
        report.await.map_err(|_| LobbyError::DispatcherStopped)
    }

    pub async fn snapshot(&self) -> Result<LobbySnapshotDto, LobbyError> {
        let (reply, snapshot) = oneshot::channel();
        self.send(LobbyEvent::Snapshot { reply })?;
        snapshot.await.map_err(|_| LobbyError::DispatcherStopped)
    }

    /// Ask the dispatcher to close every connection and stop
    pub fn shutdown(&self) {
        if self.send(LobbyEvent::Shutdown).is_err() {
            tracing::debug!("Lobby dispatcher already stopped");
        }
    }
}

/// Owner of the [`Lobby`]
pub struct Dispatcher {
    lobby: Lobby,
    auth: Arc<dyn AuthLookup>,
    clock: Arc<dyn Clock>,
    events: mpsc::UnboundedReceiver<LobbyEvent>,
    sender: mpsc::WeakUnboundedSender<LobbyEvent>,
    lookups: HashMap<ConnectionId, AbortHandle>,
}

impl Dispatcher {
    pub fn new(
        config: LobbyConfig,
        auth: Arc<dyn AuthLookup>,
        clock: Arc<dyn Clock>,
    ) -> (Self, LobbyHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            lobby: Lobby::new(config),
            auth,
            clock,
            events: rx,
            sender: tx.downgrade(),
            lookups: HashMap::new(),
        };
        (dispatcher, LobbyHandle { events: tx })
    }

    /// Process events until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("Lobby dispatcher started");
        while let Some(event) = self.events.recv().await {
            if self.handle_event(event).is_break() {
                break;
            }
        }

        for (_, lookup) in self.lookups.drain() {
            lookup.abort();
        }
        self.lobby.close_all();
        tracing::info!("Lobby dispatcher stopped");
    }

    fn handle_event(&mut self, event: LobbyEvent) -> ControlFlow<()> {
        let now = self.clock.now_millis();
        match event {
            LobbyEvent::Connect { connection } => {
                if let Err(e) = self.lobby.accept(connection, now) {
                    tracing::debug!("Connection refused: {}", e);
                }
            }
            LobbyEvent::Inbound {
                connection_id,
                frame: InboundFrame::Text(text),
            } => {
                if let Some(attempt) = self.lobby.handle_inbound(connection_id, &text, now) {
                    self.start_lookup(attempt, now);
                }
            }
            LobbyEvent::Inbound {
                connection_id,
                frame: InboundFrame::Binary,
            } => self.lobby.reject_binary(connection_id),
            LobbyEvent::Disconnect { connection_id } => {
                if let Some(lookup) = self.lookups.remove(&connection_id) {
                    lookup.abort();
                }
                self.lobby.disconnect(connection_id);
            }
            LobbyEvent::AuthResolved { attempt, outcome } => {
                self.lookups.remove(&attempt.connection_id);
                self.lobby.complete_login(&attempt, outcome, now);
            }
            LobbyEvent::Tick { done } => {
                let report = self.lobby.tick(now);
                let _ = done.send(report);
            }
            LobbyEvent::Snapshot { reply } => {
                let _ = reply.send(self.lobby.snapshot());
            }
            LobbyEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn start_lookup(&mut self, attempt: LoginAttempt, now: i64) {
        let Some(events) = self.sender.upgrade() else {
            return;
        };
        let auth = Arc::clone(&self.auth);
        let connection_id = attempt.connection_id;

        let task = tokio::spawn(async move {
            let outcome = resolve_token(auth.as_ref(), &attempt.token, now).await;
            if events
                .send(LobbyEvent::AuthResolved { attempt, outcome })
                .is_err()
            {
                tracing::debug!("Auth result for '{}' dropped: dispatcher stopped", connection_id);
            }
        });
        self.lookups.insert(connection_id, task.abort_handle());
    }
}

/// Background tasks of a running lobby
pub struct LobbyTasks {
    pub dispatcher: JoinHandle<()>,
    pub scheduler: JoinHandle<()>,
}

/// Start the dispatcher and the admission scheduler.
pub fn spawn_lobby(
    config: LobbyConfig,
    auth: Arc<dyn AuthLookup>,
    clock: Arc<dyn Clock>,
) -> (LobbyHandle, LobbyTasks) {
    let interval = config.scheduler_interval;
    let (dispatcher, handle) = Dispatcher::new(config, auth, clock);
    let tasks = LobbyTasks {
        dispatcher: tokio::spawn(dispatcher.run()),
        scheduler: tokio::spawn(run_admission_scheduler(handle.clone(), interval)),
    };
    (handle, tasks)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use clubknight_shared::time::ManualClock;
    use mockall::predicate::eq;

    use super::super::lobby::test_support::*;
    use super::*;
    use crate::config::DEFAULT_WAIT_TIMEOUT_MS;
    use crate::domain::{Stage, auth::MockAuthLookup};
    use crate::infrastructure::dto::websocket::ServerEvent;

    fn dispatcher(auth: impl AuthLookup + 'static, clock: Arc<ManualClock>) -> LobbyHandle {
        let config = LobbyConfig {
            wait_capacity: 2,
            lobby_capacity: 1,
            ..LobbyConfig::default()
        };
        let (dispatcher, handle) = Dispatcher::new(config, Arc::new(auth), clock);
        tokio::spawn(dispatcher.run());
        handle
    }

    /// Lookup that never completes and reports when it starts and is dropped
    struct HangingAuth {
        started: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AuthLookup for HangingAuth {
        async fn lookup(&self, _token: &str, _now: i64) -> Result<Option<AccountId>, AuthError> {
            let _flag = DropFlag(Arc::clone(&self.dropped));
            self.started.store(true, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    async fn wait_for(flag: &AtomicBool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !flag.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("flag was never set");
    }

    #[tokio::test]
    async fn test_login_flow_through_dispatcher() {
        // テスト項目: 接続からログイン、ティックまでを経て入室する
        // given (前提条件):
        let mut auth = MockAuthLookup::new();
        auth.expect_lookup()
            .with(eq("ABC"), eq(1_000))
            .times(1)
            .returning(|_, _| Ok(Some("alice".to_string())));
        let lobby = dispatcher(auth, Arc::new(ManualClock::new(1_000)));
        let (conn, mut rx) = connection();
        let id = conn.id();

        // when (操作):
        lobby.connect(conn).unwrap();
        lobby
            .inbound(id, InboundFrame::Text(login_frame("ABC")))
            .unwrap();
        let mut ready = false;
        for _ in 0..100 {
            let snapshot = lobby.snapshot().await.unwrap();
            if snapshot.waiting.iter().any(|w| w.stage == Stage::Ready) {
                ready = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        let report = lobby.tick().await.unwrap();

        // then (期待する結果):
        assert!(ready);
        assert_eq!(report.promoted, vec![0]);
        let snapshot = lobby.snapshot().await.unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].account_id, "alice");
        let received = events(&mut rx);
        assert_eq!(received.first(), Some(&ServerEvent::LoginPending));
        assert!(matches!(received.last(), Some(ServerEvent::Admitted { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_aborts_pending_lookup() {
        // テスト項目: 認証待ちの接続が切断されるとルックアップが中断され枠が空く
        // given (前提条件):
        let started = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let auth = HangingAuth {
            started: Arc::clone(&started),
            dropped: Arc::clone(&dropped),
        };
        let lobby = dispatcher(auth, Arc::new(ManualClock::new(0)));
        let (conn, _rx) = connection();
        let id = conn.id();
        lobby.connect(conn).unwrap();
        lobby
            .inbound(id, InboundFrame::Text(login_frame("ABC")))
            .unwrap();
        wait_for(&started).await;

        // when (操作):
        lobby.disconnect(id).unwrap();
        let snapshot = lobby.snapshot().await.unwrap();

        // then (期待する結果):
        assert!(snapshot.waiting.is_empty());
        wait_for(&dropped).await;
    }

    #[tokio::test]
    async fn test_tick_evicts_idle_connection_after_timeout() {
        // テスト項目: ログインしないまま待機時間を超えた接続はティックで 4008 により閉じられる
        // given (前提条件):
        let mut auth = MockAuthLookup::new();
        auth.expect_lookup().never();
        let clock = Arc::new(ManualClock::new(0));
        let lobby = dispatcher(auth, Arc::clone(&clock));
        let (conn, mut rx) = connection();
        lobby.connect(conn).unwrap();
        lobby.snapshot().await.unwrap();

        // when (操作):
        clock.advance(DEFAULT_WAIT_TIMEOUT_MS as i64 + 1);
        let report = lobby.tick().await.unwrap();

        // then (期待する結果):
        assert_eq!(report.evicted, 1);
        assert_eq!(
            rx.recv().await,
            Some(crate::domain::Outbound::Close {
                code: crate::domain::connection::CLOSE_LOGIN_TIMEOUT,
                reason: "login timeout".to_string()
            })
        );
        assert!(lobby.snapshot().await.unwrap().waiting.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections_and_stops() {
        // テスト項目: シャットダウンで接続が閉じられ、以降の操作はエラーになる
        // given (前提条件):
        let mut auth = MockAuthLookup::new();
        auth.expect_lookup().never();
        let lobby = dispatcher(auth, Arc::new(ManualClock::new(0)));
        let (conn, mut rx) = connection();
        lobby.connect(conn).unwrap();
        lobby.snapshot().await.unwrap();

        // when (操作):
        lobby.shutdown();
        let closed = rx.recv().await;
        let after = lobby.snapshot().await;

        // then (期待する結果):
        assert!(matches!(closed, Some(crate::domain::Outbound::Close { .. })));
        assert_eq!(after, Err(LobbyError::DispatcherStopped));
    }
}
