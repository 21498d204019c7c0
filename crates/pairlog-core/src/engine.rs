//! Main ChatEngine - the primary entry point for Pairlog
//!
//! ChatEngine ties the pieces together for one authenticated identity:
//! key agreement and caching, per-conversation outboxes, the merge-based
//! sync cycle, and the conversation roster.
//!
//! # Example
//!
//! ```ignore
//! use pairlog_core::{ChatEngine, UserId};
//!
//! let engine = Arc::new(ChatEngine::new(UserId::from("alice"), store));
//!
//! // First login: load or create key material
//! engine.ensure_keys().await?;
//!
//! // Send and reconcile
//! engine.send_message(&bob, "hi there").await?;
//! let outcome = engine.sync(&bob).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::crypto::SharedKey;
use crate::envelope::SealedLog;
use crate::error::{ChatError, ChatResult};
use crate::keys::{derive_shared_key, fetch_public_key, ChatKeypair};
use crate::merge::merge;
use crate::outbox::{Outbox, OutboxItem};
use crate::roster::Roster;
use crate::store::{chat_log_path, Fetch, LogStore};
use crate::types::{Message, UserId};

/// Result of one sync cycle, ready for display.
///
/// Not-connected is a state, not an error: it is expected for as long as
/// the counterparty has never published a key, and is retried on every
/// poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Both parties reachable; the reconciled conversation view
    Connected {
        /// Merged log in `received_at` order
        messages: Vec<Message>,
    },
    /// The counterparty's public key could not be fetched
    CounterpartyNotConnected,
}

/// Sync and messaging engine for one identity.
///
/// Holds the process-lifetime caches (own key pair, per-counterparty
/// shared keys, per-counterparty outboxes) and exposes the three
/// operations everything else funnels through: `send_message`, `sync`,
/// and the roster accessors. All methods take `&self`; wrap the engine in
/// an `Arc` to share it with pollers.
pub struct ChatEngine {
    my_id: UserId,
    store: Arc<dyn LogStore>,
    /// Own key pair, loaded once (tokio Mutex: initialization awaits the store)
    keypair: tokio::sync::Mutex<Option<Arc<ChatKeypair>>>,
    /// Derived pairwise keys, cached for the process lifetime
    shared_keys: RwLock<HashMap<UserId, SharedKey>>,
    /// One outbox per conversation, created on first use
    outboxes: RwLock<HashMap<UserId, Arc<Outbox>>>,
}

impl ChatEngine {
    /// Create an engine for the given identity and store binding.
    pub fn new(my_id: UserId, store: Arc<dyn LogStore>) -> Self {
        Self {
            my_id,
            store,
            keypair: tokio::sync::Mutex::new(None),
            shared_keys: RwLock::new(HashMap::new()),
            outboxes: RwLock::new(HashMap::new()),
        }
    }

    /// The identity this engine acts as.
    pub fn my_id(&self) -> &UserId {
        &self.my_id
    }

    // ═══════════════════════════════════════════════════════════════════
    // Key material
    // ═══════════════════════════════════════════════════════════════════

    /// Load key material, generating and publishing a pair on first login.
    pub async fn ensure_keys(&self) -> ChatResult<()> {
        let mut cached = self.keypair.lock().await;
        if cached.is_some() {
            return Ok(());
        }

        if let Some(pair) = ChatKeypair::load(self.store.as_ref()).await? {
            info!(me = %self.my_id, "Loaded existing key pair");
            *cached = Some(Arc::new(pair));
        } else {
            info!(me = %self.my_id, "Generating new key pair");
            let pair = ChatKeypair::generate();
            pair.publish(self.store.as_ref()).await?;
            *cached = Some(Arc::new(pair));
        }

        Ok(())
    }

    /// Own key pair, loading it from the store on first call.
    ///
    /// # Errors
    ///
    /// [`ChatError::KeyUnavailable`] if no pair has been published yet.
    /// Retryable: key generation may still be in flight elsewhere.
    async fn keypair(&self) -> ChatResult<Arc<ChatKeypair>> {
        let mut cached = self.keypair.lock().await;
        if let Some(pair) = cached.as_ref() {
            return Ok(pair.clone());
        }

        match ChatKeypair::load(self.store.as_ref()).await? {
            Some(pair) => {
                let pair = Arc::new(pair);
                *cached = Some(pair.clone());
                Ok(pair)
            }
            None => Err(ChatError::KeyUnavailable),
        }
    }

    /// Pairwise shared key with the given counterparty, derived once and
    /// cached for the process lifetime.
    ///
    /// # Errors
    ///
    /// [`ChatError::KeyUnavailable`] if my own pair is missing;
    /// [`ChatError::CounterpartyNotConnected`] if theirs cannot be fetched
    /// (never published, or unreachable).
    pub async fn shared_key(&self, counterparty: &UserId) -> ChatResult<SharedKey> {
        if let Some(key) = self.shared_keys.read().get(counterparty) {
            return Ok(key.clone());
        }

        let mine = self.keypair().await?;
        let theirs = match fetch_public_key(self.store.as_ref(), counterparty).await? {
            Fetch::Found(pk) => pk,
            Fetch::Absent | Fetch::Unreachable => {
                return Err(ChatError::CounterpartyNotConnected(counterparty.clone()))
            }
        };

        let key = derive_shared_key(&mine, &theirs);
        self.shared_keys
            .write()
            .insert(counterparty.clone(), key.clone());
        Ok(key)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Messaging
    // ═══════════════════════════════════════════════════════════════════

    /// The outbox for a conversation, created on first use.
    pub fn outbox(&self, counterparty: &UserId) -> Arc<Outbox> {
        if let Some(outbox) = self.outboxes.read().get(counterparty) {
            return outbox.clone();
        }
        self.outboxes
            .write()
            .entry(counterparty.clone())
            .or_insert_with(|| Arc::new(Outbox::new(counterparty.clone())))
            .clone()
    }

    /// Send a message: compose, enqueue, and flush to my log.
    ///
    /// The returned message carries its durable stamps (`sent_at ==
    /// received_at` for the author). Callers normally follow up with
    /// [`ChatEngine::sync`] so the view refreshes immediately.
    pub async fn send_message(
        &self,
        counterparty: &UserId,
        content: impl Into<String>,
    ) -> ChatResult<Message> {
        let key = self.shared_key(counterparty).await?;
        let message = Message::compose(self.my_id.clone(), content);

        let outbox = self.outbox(counterparty);
        outbox.enqueue(OutboxItem {
            counterparty: counterparty.clone(),
            message: message.clone(),
        });
        outbox.drain(self.store.as_ref(), &key).await?;

        Ok(message)
    }

    /// One full sync cycle against the remote store.
    ///
    /// Reads my log and their log (both absent-tolerant, defaulting to
    /// empty), merges, persists newly discovered messages into my log via
    /// the outbox, and returns the merged view. My log thereby becomes a
    /// superset mirror of everything I have ever seen, so a fresh session
    /// rebuilds full history from it alone.
    ///
    /// # Errors
    ///
    /// [`ChatError::KeyUnavailable`] while my own keys are missing
    /// (retryable); decryption/parse/store failures abort this cycle and
    /// surface to the caller. A missing counterparty key is not an error;
    /// it returns [`SyncOutcome::CounterpartyNotConnected`].
    pub async fn sync(&self, counterparty: &UserId) -> ChatResult<SyncOutcome> {
        let key = match self.shared_key(counterparty).await {
            Ok(key) => key,
            Err(ChatError::CounterpartyNotConnected(_)) => {
                debug!(%counterparty, "Counterparty key not available yet");
                return Ok(SyncOutcome::CounterpartyNotConnected);
            }
            Err(e) => return Err(e),
        };

        // My log: absence is the empty conversation
        let mine = match self.store.get_own(&chat_log_path(counterparty)).await? {
            Some(json) => SealedLog::decode(&key, &json)?,
            None => Vec::new(),
        };

        // Their log: absent means they have not written yet; unreachable
        // means we cannot tell what they wrote
        let theirs = match self
            .store
            .get_other(counterparty, &chat_log_path(&self.my_id))
            .await
        {
            Fetch::Found(json) => SealedLog::decode(&key, &json)?,
            Fetch::Absent => Vec::new(),
            Fetch::Unreachable => {
                debug!(%counterparty, "Counterparty log unreachable");
                return Ok(SyncOutcome::CounterpartyNotConnected);
            }
        };

        let result = merge(mine, &theirs, Utc::now());

        if !result.newly_added.is_empty() {
            debug!(
                %counterparty,
                discovered = result.newly_added.len(),
                "Recording newly discovered messages"
            );
            let outbox = self.outbox(counterparty);
            for message in &result.newly_added {
                outbox.enqueue(OutboxItem {
                    counterparty: counterparty.clone(),
                    message: message.clone(),
                });
            }
            outbox.drain(self.store.as_ref(), &key).await?;
        }

        Ok(SyncOutcome::Connected {
            messages: result.merged,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Roster
    // ═══════════════════════════════════════════════════════════════════

    /// Record a conversation in the roster, if not already present.
    pub async fn remember_conversation(&self, counterparty: &UserId) -> ChatResult<()> {
        let mut roster = Roster::load(self.store.as_ref()).await?;
        if roster.remember(counterparty.clone()) {
            roster.save(self.store.as_ref()).await?;
        }
        Ok(())
    }

    /// All counterparties ever conversed with, in first-opened order.
    pub async fn conversations(&self) -> ChatResult<Vec<UserId>> {
        let roster = Roster::load(self.store.as_ref()).await?;
        Ok(roster.counterparties().to_vec())
    }
}
