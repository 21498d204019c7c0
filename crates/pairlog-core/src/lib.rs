//! Pairlog Core Library
//!
//! Peer-to-peer, end-to-end-encrypted two-party chat over a shared but
//! untrusted object store.
//!
//! ## Overview
//!
//! There is no broker and no central sequencing: each party owns one
//! append-only encrypted log per conversation, writes only to its own log,
//! and reads the counterparty's log to learn new messages. Reconciliation
//! runs on a fixed polling schedule plus on-demand nudges, making this a
//! miniature leaderless replication protocol with at-least-once delivery
//! and a merge that privileges no writer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ConversationPoller   timer + on-demand wakeups              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ChatEngine           key cache · sync cycle · roster        │
//! │    ├── keys           P-384 ECDH + HKDF → SharedKey          │
//! │    ├── merge          deterministic union by message id      │
//! │    └── outbox         write-coalescing drain per conversation│
//! ├──────────────────────────────────────────────────────────────┤
//! │  envelope / crypto    JSON log → ChaCha20-Poly1305 blob      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  LogStore (external)  get/put of owned blobs, no CAS         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security model
//!
//! Confidentiality only: logs are sealed under a pairwise ECDH-derived key
//! and the AEAD tag rejects tampering, but there is no sender
//! authentication beyond "whoever can write to this path authored it".
//! That limitation is deliberate and part of the wire format contract.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pairlog_core::{ChatEngine, ConversationPoller, UserId};
//!
//! let engine = Arc::new(ChatEngine::new(UserId::from("alice"), store));
//! engine.ensure_keys().await?;
//!
//! let bob = UserId::from("bob");
//! let poller = ConversationPoller::spawn(engine.clone(), bob.clone(), None);
//!
//! engine.send_message(&bob, "hi!").await?;
//! poller.sync_now();
//! ```

pub mod crypto;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod merge;
pub mod outbox;
pub mod poller;
pub mod roster;
pub mod store;
pub mod types;

// Re-exports
pub use crypto::{LogCrypto, SharedKey, NONCE_SIZE};
pub use engine::{ChatEngine, SyncOutcome};
pub use envelope::SealedLog;
pub use error::{ChatError, ChatResult};
pub use keys::{derive_shared_key, fetch_public_key, ChatKeypair};
pub use merge::{merge, MergeResult};
pub use outbox::{DrainOutcome, Outbox, OutboxItem};
pub use poller::{ConversationPoller, ConversationState, DEFAULT_POLL_INTERVAL};
pub use roster::Roster;
pub use store::{
    chat_log_path, Blob, Fetch, LogStore, MemoryCloud, MemoryLogStore, StoreError,
    PRIVATE_KEY_PATH, PUBLIC_KEY_PATH, ROSTER_PATH,
};
pub use types::{Message, MessageId, UserId};
