//! Shared domain types for Agora.
//!
//! This crate contains the domain types used across the chat fan-out core:
//! `Identity`, `ChatEvent` and its bus wire codec, configuration types, and
//! the error taxonomy shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
