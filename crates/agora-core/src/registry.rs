//! Session registry: which identities are connected to this process, and how
//! to reach them.
//!
//! Backed by a `DashMap` keyed by identity. Inserts and removes take the
//! shard write lock; broadcast iterates under shard read locks, so a
//! registration can never be lost and the map is never mutated under an
//! in-flight iteration. Sends are non-blocking enqueues, so holding a read
//! guard during broadcast never waits on a client.

use agora_types::error::TransportError;
use agora_types::identity::Identity;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::{OutboundHandle, SessionId};

/// The live binding between an identity and its open transport.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    identity: Identity,
    outbound: OutboundHandle,
    connected_at: DateTime<Utc>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn outbound(&self) -> &OutboundHandle {
        &self.outbound
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}

/// Result of [`SessionRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    /// ID of the newly registered session.
    pub session_id: SessionId,
    /// The session previously registered under the same identity, if any.
    /// It is no longer in the registry; closing it is the caller's decision.
    pub replaced: Option<Session>,
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Transports the line was queued on.
    pub delivered: usize,
    /// Transports that were closed or whose queue was full.
    pub failed: usize,
}

/// Thread-safe map of connected identities to their outbound handles.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Identity, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity`, replacing any session already bound to it.
    pub fn register(&self, identity: Identity, outbound: OutboundHandle) -> Registration {
        let session = Session {
            id: Uuid::now_v7(),
            identity: identity.clone(),
            outbound,
            connected_at: Utc::now(),
        };
        let session_id = session.id;

        let replaced = self.sessions.insert(identity.clone(), session);
        match &replaced {
            Some(previous) => info!(
                %identity,
                %session_id,
                replaced_session = %previous.id,
                "session registered, replacing previous connection"
            ),
            None => info!(%identity, %session_id, "session registered"),
        }

        Registration {
            session_id,
            replaced,
        }
    }

    /// Remove whatever session is bound to `identity`. No-op if absent.
    ///
    /// Returns `true` if a session was removed.
    pub fn unregister(&self, identity: &Identity) -> bool {
        let removed = self.sessions.remove(identity);
        if let Some((_, session)) = &removed {
            info!(%identity, session_id = %session.id, "session unregistered");
        }
        removed.is_some()
    }

    /// Remove the binding for `identity` only if it still belongs to
    /// `session_id`. A connection that was replaced can therefore never
    /// evict its successor.
    pub fn release(&self, identity: &Identity, session_id: SessionId) -> bool {
        let removed = self
            .sessions
            .remove_if(identity, |_, session| session.id == session_id)
            .is_some();
        if removed {
            info!(%identity, %session_id, "session released");
        } else {
            debug!(%identity, %session_id, "session already replaced or removed");
        }
        removed
    }

    /// The outbound handle bound to `identity`, if connected.
    pub fn lookup(&self, identity: &Identity) -> Option<OutboundHandle> {
        self.sessions
            .get(identity)
            .map(|session| session.outbound.clone())
    }

    /// Send a line to one identity. Returns `true` if it was queued.
    pub fn send_to(&self, identity: &Identity, line: &str) -> bool {
        match self.lookup(identity) {
            Some(outbound) => match outbound.send_frame(line.to_string()) {
                Ok(()) => true,
                Err(err) => {
                    debug!(%identity, error = %err, "direct send failed");
                    false
                }
            },
            None => false,
        }
    }

    /// Queue `line` on every registered transport.
    ///
    /// A failing transport never prevents delivery to the others. Closed
    /// transports are pruned so the registry keeps tracking only open ones.
    pub fn broadcast(&self, line: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut closed: Vec<(Identity, SessionId)> = Vec::new();

        for entry in self.sessions.iter() {
            let session = entry.value();
            match session.outbound.send_frame(line.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(TransportError::Closed) => {
                    report.failed += 1;
                    closed.push((session.identity.clone(), session.id));
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        identity = %session.identity,
                        error = %err,
                        "dropping broadcast line for slow client"
                    );
                }
            }
        }

        // Iteration guards are released; safe to mutate now.
        for (identity, session_id) in closed {
            self.release(&identity, session_id);
        }

        report
    }

    /// Identities currently connected, sorted.
    pub fn identities(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> =
            self.sessions.iter().map(|e| e.key().clone()).collect();
        identities.sort();
        identities
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session and empty the registry (process shutdown).
    ///
    /// Writers flush their queued frames before closing. Returns the number
    /// of sessions closed.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<Session> = self.sessions.iter().map(|e| e.value().clone()).collect();
        for session in &sessions {
            session.outbound.close();
        }
        for session in &sessions {
            self.release(&session.identity, session.id);
        }
        info!(closed = sessions.len(), "closed all sessions");
        sessions.len()
    }
}
