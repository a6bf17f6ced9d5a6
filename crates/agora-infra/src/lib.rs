//! Infrastructure layer for Agora.
//!
//! Contains implementations of the ports defined in `agora-core`: the SQLite
//! message store, the in-process and Redis broadcast buses, and the
//! configuration file loader.

pub mod bus;
pub mod config;
pub mod sqlite;
