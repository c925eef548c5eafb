//! WebSocket message envelopes.
//!
//! Every frame in either direction is `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{SessionSlot, SlotRef};

/// Client → server frame. The payload is left untyped for schema validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl InboundEnvelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Public view of a lobby participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub local_index: usize,
    pub account_id: String,
    pub posx: f64,
    pub posy: f64,
    pub tarx: f64,
    pub tary: f64,
}

impl PlayerInfo {
    pub fn from_slot(slot: SlotRef, session: &SessionSlot) -> Self {
        let presence = session.presence();
        Self {
            local_index: slot.index,
            account_id: session.account_id().to_string(),
            posx: presence.posx,
            posy: presence.posy,
            tarx: presence.tarx,
            tary: presence.tary,
        }
    }
}

/// Server → client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Token passed validation and is being checked
    LoginPending,
    LoginRejected {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Admitted {
        local_index: usize,
        account_id: String,
        players: Vec<PlayerInfo>,
    },
    ParticipantJoined(PlayerInfo),
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        local_index: usize,
        account_id: String,
    },
    #[serde(rename_all = "camelCase")]
    PositionChanged {
        local_index: usize,
        posx: f64,
        posy: f64,
        tarx: f64,
        tary: f64,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        local_index: usize,
        account_id: String,
        msg: String,
        expires_at: i64,
    },
    Ack {
        mytime: f64,
        servertime: i64,
    },
    Error {
        reason: String,
    },
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
