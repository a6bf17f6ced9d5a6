//! Connection management and broadcast core for Agora.
//!
//! This crate defines the ports (`MessageStore`, `BroadcastBus`,
//! `FrameSource`) that the infrastructure layer (agora-infra) implements, and
//! the concurrency core built on them: the session registry, the per-connection
//! chat session handler, and the process-wide bus listener. It depends only on
//! `agora-types` -- never on a database, broker, or HTTP crate.

pub mod backoff;
pub mod bus;
pub mod handler;
pub mod listener;
pub mod registry;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
