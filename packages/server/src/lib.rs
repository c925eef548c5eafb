//! ClubKnight lobby server library.
//!
//! Accepts WebSocket connections into a bounded waiting pool, authenticates
//! them out of band, and periodically promotes authenticated connections into
//! a bounded set of lobby slots.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
