//! Shared state handed to every request handler.

use crate::usecase::LobbyHandle;

/// Shared application state
pub struct AppState {
    /// Lobby（入室待ちからロビーまでの管理）
    pub lobby: LobbyHandle,
}
