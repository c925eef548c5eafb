//! Transport-agnostic connection handle.
//!
//! The WebSocket layer creates one [`ConnectionHandle`] per upgraded socket and
//! hands it to the lobby. Whoever holds the handle owns the connection: it is
//! deliberately not `Clone`, so moving it from a waiting entry into a session
//! slot is a transfer, never a copy.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::MessagePushError;

/// Close code sent to every connection on server shutdown
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code sent when no waiting slot is free (RFC 6455 "Try Again Later")
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
/// Close code sent when a waiting connection never logged in
pub const CLOSE_LOGIN_TIMEOUT: u16 = 4008;

/// Item queued for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Sending half of a connection's outbound queue
pub type PusherChannel = mpsc::UnboundedSender<Outbound>;

/// Unique identifier of one accepted socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Exclusive owner of a connection's outbound queue
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: PusherChannel,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: PusherChannel) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a text frame
    pub fn push(&self, text: String) -> Result<(), MessagePushError> {
        self.sender
            .send(Outbound::Text(text))
            .map_err(|_| MessagePushError::ChannelClosed(self.id.to_string()))
    }

    /// Queue a close frame. The writer task stops after sending it.
    pub fn close(&self, code: u16, reason: &str) {
        if self
            .sender
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .is_err()
        {
            tracing::debug!("Connection '{}' already gone, close dropped", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_reaches_receiver() {
        // テスト項目: push したテキストが受信側に届く
        // given (前提条件):
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(ConnectionId::generate(), tx);

        // when (操作):
        let result = handle.push("hello".to_string());

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(rx.try_recv(), Ok(Outbound::Text("hello".to_string())));
    }

    #[test]
    fn test_push_after_receiver_dropped_fails() {
        // テスト項目: 受信側が閉じた後の push はエラーになる
        // given (前提条件):
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::generate();
        let handle = ConnectionHandle::new(id, tx);
        drop(rx);

        // when (操作):
        let result = handle.push("hello".to_string());

        // then (期待する結果):
        assert_eq!(result, Err(MessagePushError::ChannelClosed(id.to_string())));
    }

    #[test]
    fn test_close_queues_close_frame() {
        // テスト項目: close がクローズフレームをキューに積む
        // given (前提条件):
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(ConnectionId::generate(), tx);

        // when (操作):
        handle.close(CLOSE_TRY_AGAIN_LATER, "capacity exceeded");

        // then (期待する結果):
        assert_eq!(
            rx.try_recv(),
            Ok(Outbound::Close {
                code: CLOSE_TRY_AGAIN_LATER,
                reason: "capacity exceeded".to_string(),
            })
        );
    }
}
