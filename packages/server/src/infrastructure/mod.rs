//! Infrastructure layer: wire formats and collaborator implementations.

pub mod auth;
pub mod dto;
