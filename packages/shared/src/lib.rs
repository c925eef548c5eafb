//! Utilities shared by the ClubKnight server binary and its tests.

pub mod logger;
pub mod time;
