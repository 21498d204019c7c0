//! Conversation roster
//!
//! A deduplicated list of every counterparty I have opened a conversation
//! with, kept at a well-known store path so a fresh session can enumerate
//! its conversations. Stored as plain JSON; the path sits under the store's
//! own at-rest encryption, like the private key.

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::store::{LogStore, ROSTER_PATH};
use crate::types::UserId;

/// The set of known conversations, in first-opened order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    counterparties: Vec<UserId>,
}

impl Roster {
    /// Load the roster from the store; absent means empty.
    pub async fn load(store: &dyn LogStore) -> ChatResult<Self> {
        match store.get_own(ROSTER_PATH).await? {
            Some(json) => serde_json::from_slice(&json)
                .map_err(|e| ChatError::MalformedPayload(format!("Bad roster document: {}", e))),
            None => Ok(Self::default()),
        }
    }

    /// Write the roster back, replacing any previous value.
    pub async fn save(&self, store: &dyn LogStore) -> ChatResult<()> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ChatError::Serialization(format!("Failed to encode roster: {}", e)))?;
        store.put_own(ROSTER_PATH, json).await?;
        Ok(())
    }

    /// Add a counterparty if not already present.
    ///
    /// Returns `true` when the roster changed and needs saving.
    pub fn remember(&mut self, counterparty: UserId) -> bool {
        if self.counterparties.contains(&counterparty) {
            return false;
        }
        self.counterparties.push(counterparty);
        true
    }

    /// All known counterparties.
    pub fn counterparties(&self) -> &[UserId] {
        &self.counterparties
    }
}
