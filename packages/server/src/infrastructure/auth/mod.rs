//! `AuthLookup` implementations.

pub mod inmemory;

pub use inmemory::InMemoryAuthStore;
