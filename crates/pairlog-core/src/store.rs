//! Remote log store interface
//!
//! The remote store is an external collaborator: a shared but untrusted
//! object store keyed by `(owner identity, path)`, offering plain get/put of
//! opaque blobs with no compare-and-swap primitive. Each user can only write
//! to objects they own and must read the counterparty's objects to learn new
//! messages.
//!
//! This module defines the read/write contract the sync engine consumes,
//! the well-known path layout, and an in-process [`MemoryCloud`] reference
//! implementation used by tests and embedders.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::types::UserId;

/// Opaque stored value
pub type Blob = Vec<u8>;

/// Path of the blob holding a user's published public key
pub const PUBLIC_KEY_PATH: &str = "public_key";

/// Path of the blob holding a user's private key.
///
/// The store applies its own at-rest encryption to this path; the core
/// treats it as one more owned blob.
pub const PRIVATE_KEY_PATH: &str = "private_key";

/// Path of the blob holding the conversation roster
pub const ROSTER_PATH: &str = "chats";

/// Path of my conversation log with the given counterparty.
///
/// One log per `(owner, counterparty)` pair; the counterparty's half of the
/// conversation lives at the mirrored path under their identity.
pub fn chat_log_path(counterparty: &UserId) -> String {
    format!("chats/{}", counterparty)
}

/// Transient remote store I/O failure
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(String);

impl StoreError {
    /// Create a store error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Outcome of fetching a blob owned by another identity.
///
/// Keeps "never published" distinct from "could not reach" where the store
/// can tell them apart. Stores that cannot distinguish report `Absent` for
/// both; callers treat either as the counterparty-not-connected state, so
/// nothing is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch<T> {
    /// The blob exists and was read
    Found(T),
    /// The owner has never published a blob at this path
    Absent,
    /// The blob could not be fetched (network or permission failure)
    Unreachable,
}

impl<T> Fetch<T> {
    /// Map the contained value, preserving `Absent`/`Unreachable`.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Found(value) => Fetch::Found(f(value)),
            Fetch::Absent => Fetch::Absent,
            Fetch::Unreachable => Fetch::Unreachable,
        }
    }

    /// True if the blob was read.
    pub fn is_found(&self) -> bool {
        matches!(self, Fetch::Found(_))
    }
}

/// Read/write contract of the remote object store.
///
/// An implementation is bound to one authenticated identity: `get_own` and
/// `put_own` operate on that identity's objects, `get_other` reads objects
/// owned by someone else. Writes are full overwrites; there is no atomic
/// read-modify-write, which is why [`crate::outbox::Outbox`] serializes all
/// local writers per path.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Read a blob I own. Absence is a normal, non-error outcome.
    async fn get_own(&self, path: &str) -> Result<Option<Blob>, StoreError>;

    /// Write a blob I own, replacing any previous value.
    async fn put_own(&self, path: &str, blob: Blob) -> Result<(), StoreError>;

    /// Read a blob owned by another identity.
    async fn get_other(&self, owner: &UserId, path: &str) -> Fetch<Blob>;
}

#[derive(Default)]
struct CloudState {
    objects: HashMap<(UserId, String), Blob>,
    offline: HashSet<UserId>,
    writes: u64,
}

/// In-process object store shared by every simulated identity.
///
/// Test double for the real remote store: hand each party a
/// [`MemoryLogStore`] via [`MemoryCloud::store_for`] and they observe each
/// other's writes exactly as they would through the network. Identities can
/// be taken offline to exercise unreachable paths, and writes are counted
/// so coalescing behaviour is observable.
///
/// # Example
///
/// ```ignore
/// let cloud = MemoryCloud::new();
/// let alice_store = cloud.store_for(UserId::from("alice"));
/// let bob_store = cloud.store_for(UserId::from("bob"));
/// ```
#[derive(Clone, Default)]
pub struct MemoryCloud {
    state: Arc<RwLock<CloudState>>,
}

impl MemoryCloud {
    /// Create a new empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a store handle bound to the given identity.
    pub fn store_for(&self, me: UserId) -> MemoryLogStore {
        MemoryLogStore {
            state: self.state.clone(),
            me,
        }
    }

    /// Simulate an identity dropping off the network.
    ///
    /// While offline, the identity's own reads/writes fail with
    /// [`StoreError`] and other parties see its blobs as `Unreachable`.
    pub fn set_offline(&self, user: &UserId, offline: bool) {
        let mut state = self.state.write();
        if offline {
            state.offline.insert(user.clone());
        } else {
            state.offline.remove(user);
        }
    }

    /// Total number of successful `put_own` calls across all identities.
    pub fn write_count(&self) -> u64 {
        self.state.read().writes
    }
}

/// Store handle bound to one identity of a [`MemoryCloud`].
#[derive(Clone)]
pub struct MemoryLogStore {
    state: Arc<RwLock<CloudState>>,
    me: UserId,
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn get_own(&self, path: &str) -> Result<Option<Blob>, StoreError> {
        let state = self.state.read();
        if state.offline.contains(&self.me) {
            return Err(StoreError::new(format!("{} is offline", self.me)));
        }
        Ok(state.objects.get(&(self.me.clone(), path.to_string())).cloned())
    }

    async fn put_own(&self, path: &str, blob: Blob) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.offline.contains(&self.me) {
            return Err(StoreError::new(format!("{} is offline", self.me)));
        }
        state.objects.insert((self.me.clone(), path.to_string()), blob);
        state.writes += 1;
        Ok(())
    }

    async fn get_other(&self, owner: &UserId, path: &str) -> Fetch<Blob> {
        let state = self.state.read();
        if state.offline.contains(owner) {
            return Fetch::Unreachable;
        }
        match state.objects.get(&(owner.clone(), path.to_string())) {
            Some(blob) => Fetch::Found(blob.clone()),
            None => Fetch::Absent,
        }
    }
}
