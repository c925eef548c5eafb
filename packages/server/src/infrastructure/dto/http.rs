//! HTTP API response DTOs.

use serde::Serialize;

use crate::domain::{Presence, Stage};

/// One non-idle waiting slot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingEntryDto {
    pub index: usize,
    pub stage: Stage,
    pub account_id: String,
    pub entered_at: Option<String>,
}

/// One occupied lobby slot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSlotDto {
    pub local_index: usize,
    pub account_id: String,
    pub joined_at: Option<String>,
    pub presence: Presence,
}

/// Snapshot of both pools, served at `/debug/lobby`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshotDto {
    pub wait_capacity: usize,
    pub lobby_capacity: usize,
    pub waiting: Vec<WaitingEntryDto>,
    pub players: Vec<SessionSlotDto>,
}
