//! Inbound message schemas.

use std::sync::LazyLock;

use serde::Deserialize;
use serde_json::Value;

use super::schema::{Kind, Schema};

pub const LOGIN: &str = "login";
pub const CHANGE_POSITION: &str = "changePosition";
pub const CHAT: &str = "chat";
pub const SYN: &str = "syn";

/// Longest chat line accepted, in characters
pub const MAX_CHAT_CHARS: usize = 200;

pub static LOGIN_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(LOGIN)
        .pattern("token", "[A-Z]{1,100}")
        .unwrap_or_else(|e| panic!("login token pattern must compile: {e}"))
});

pub static CHANGE_POSITION_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(CHANGE_POSITION)
        .kind("posx", Kind::Number)
        .kind("posy", Kind::Number)
        .kind("tarx", Kind::Number)
        .kind("tary", Kind::Number)
});

pub static CHAT_SCHEMA: LazyLock<Schema> =
    LazyLock::new(|| Schema::new(CHAT).predicate("msg", is_chat_line));

pub static SYN_SCHEMA: LazyLock<Schema> =
    LazyLock::new(|| Schema::new(SYN).kind("mytime", Kind::Number));

fn is_chat_line(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| (1..=MAX_CHAT_CHARS).contains(&s.chars().count()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginPayload {
    pub token: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChangePositionPayload {
    pub posx: f64,
    pub posy: f64,
    pub tarx: f64,
    pub tary: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub msg: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SynPayload {
    pub mytime: f64,
}
