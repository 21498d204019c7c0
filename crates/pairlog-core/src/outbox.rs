//! Write-coalescing outbox for one conversation
//!
//! The remote store offers no atomic read-modify-write, so every local
//! writer of "my log" (sends, poll ticks, merge discoveries) funnels
//! through a per-counterparty [`Outbox`] that serializes them into whole
//! read-merge-write cycles:
//!
//! ```text
//! enqueue ──► queue ──► drain: snapshot batch
//!                              read my log
//!                              append batch (dup-suppressed)
//!                              write my log   (one put per batch)
//!                              repeat while queue non-empty
//! ```
//!
//! At most one drain is in flight per counterparty at a time; a concurrent
//! caller returns immediately and the in-flight drain picks up whatever was
//! enqueued meanwhile. The drain is an explicit loop, so worst-case stack
//! usage is independent of message volume.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::crypto::SharedKey;
use crate::envelope::SealedLog;
use crate::error::ChatResult;
use crate::store::{chat_log_path, LogStore};
use crate::types::{Message, UserId};

/// A pending append operation.
#[derive(Debug, Clone)]
pub struct OutboxItem {
    /// Conversation this append targets
    pub counterparty: UserId,
    /// The message to append to my log
    pub message: Message,
}

/// Result of a [`Outbox::drain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This call flushed the queue; `appended` messages were newly persisted
    Completed { appended: usize },
    /// Another drain was already in flight and will pick up the queue
    Deferred,
}

/// In-memory queue of pending log appends for one counterparty.
///
/// Ephemeral by design: a restart loses only arrivals that the next sync
/// immediately re-derives from the counterparty's log. Locally authored
/// messages lost to a failed drain write are gone, an accepted
/// at-most-once gap for sends that fail mid-write.
pub struct Outbox {
    counterparty: UserId,
    queue: Mutex<Vec<OutboxItem>>,
    in_flight: AtomicBool,
}

impl Outbox {
    /// Create an empty outbox for the given conversation.
    pub fn new(counterparty: UserId) -> Self {
        Self {
            counterparty,
            queue: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// The conversation this outbox serves.
    pub fn counterparty(&self) -> &UserId {
        &self.counterparty
    }

    /// Append a pending operation to the queue.
    ///
    /// Synchronous and non-blocking; durable only after a later drain.
    pub fn enqueue(&self, item: OutboxItem) {
        self.queue.lock().push(item);
    }

    /// Number of operations waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Flush the queue to the remote store.
    ///
    /// Safe to invoke concurrently from any number of call sites; the
    /// in-flight flag guarantees at most one remote write cycle per
    /// counterparty at a time. Each cycle snapshots the queue, reads my
    /// log, appends every batch item whose id is not already present, and
    /// writes the log back with a single `put_own`. Items enqueued during
    /// a cycle are flushed by a follow-up cycle before this call returns.
    ///
    /// # Errors
    ///
    /// A store or codec failure aborts the current cycle; the snapshot
    /// batch is not re-enqueued. Remote-sourced items resurface on a later
    /// merge, locally authored ones do not.
    pub async fn drain(&self, store: &dyn LogStore, key: &SharedKey) -> ChatResult<DrainOutcome> {
        let mut acquired = false;
        let mut appended = 0;

        loop {
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // The drain holding the flag re-checks the queue after
                // releasing, so anything we enqueued is covered.
                return Ok(if acquired {
                    DrainOutcome::Completed { appended }
                } else {
                    DrainOutcome::Deferred
                });
            }
            acquired = true;

            let result = self.run_cycles(store, key).await;
            self.in_flight.store(false, Ordering::Release);
            appended += result?;

            // Arrivals can race the flag release above; they expect the
            // in-flight drain to pick them up, so check once more.
            if self.queue.lock().is_empty() {
                return Ok(DrainOutcome::Completed { appended });
            }
        }
    }

    /// Flush batches until a queue snapshot comes back empty.
    ///
    /// Caller must hold the in-flight flag.
    async fn run_cycles(&self, store: &dyn LogStore, key: &SharedKey) -> ChatResult<usize> {
        let mut appended = 0;

        loop {
            let batch = std::mem::take(&mut *self.queue.lock());
            if batch.is_empty() {
                return Ok(appended);
            }
            appended += self.flush_batch(batch, store, key).await?;
        }
    }

    /// One read-merge-write cycle for a snapshot batch.
    async fn flush_batch(
        &self,
        batch: Vec<OutboxItem>,
        store: &dyn LogStore,
        key: &SharedKey,
    ) -> ChatResult<usize> {
        let path = chat_log_path(&self.counterparty);

        // Absence is a normal outcome: first write creates the log
        let mut log = match store.get_own(&path).await? {
            Some(json) => SealedLog::decode(key, &json)?,
            None => Vec::new(),
        };

        let mut seen: std::collections::HashSet<_> = log.iter().map(|m| m.id).collect();
        let mut appended = 0;

        for item in batch {
            if item.counterparty != self.counterparty {
                // Queue mis-routing; drop rather than corrupt another log
                warn!(
                    expected = %self.counterparty,
                    got = %item.counterparty,
                    message_id = %item.message.id,
                    "Dropping mis-routed outbox item"
                );
                continue;
            }
            if seen.insert(item.message.id) {
                log.push(item.message);
                appended += 1;
            }
        }

        if appended > 0 {
            let json = SealedLog::encode(key, &log)?;
            store.put_own(&path, json).await?;
            debug!(counterparty = %self.counterparty, appended, total = log.len(), "Drained outbox batch");
        }

        Ok(appended)
    }
}
