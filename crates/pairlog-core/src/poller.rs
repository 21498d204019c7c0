//! Interval-driven conversation polling
//!
//! The remote store offers no subscribe/watch primitive, so reconciliation
//! is fundamentally poll-based: a background task wakes on a timer (and on
//! demand after sends or when the conversation is opened), funnels through
//! [`ChatEngine::sync`], and publishes the resulting view through a watch
//! channel. Timer-driven suspension, never a busy-wait.
//!
//! Cancellation is cooperative: dropping or stopping the poller lets any
//! in-flight store operation complete, but its result is discarded rather
//! than published.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{ChatEngine, SyncOutcome};
use crate::error::ChatError;
use crate::types::{Message, UserId};

/// Default fixed polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// What the conversation view should currently show.
///
/// Exactly one of: still loading, the counterparty has never connected,
/// a connected conversation, or an error. A log that fails to open yields
/// zero messages plus `Failed`, never a partial decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    /// No sync has completed yet (or our own keys are still being set up)
    Loading,
    /// The counterparty has not published a key, or is unreachable
    CounterpartyNotConnected,
    /// Reconciled view of the conversation
    Connected {
        /// Merged log in `received_at` order
        messages: Vec<Message>,
    },
    /// The last sync cycle failed; polling continues
    Failed {
        /// Human-readable failure description
        message: String,
    },
}

/// Handle to a background polling task for one conversation.
///
/// # Example
///
/// ```ignore
/// let poller = ConversationPoller::spawn(engine.clone(), bob.clone(), None);
/// let mut states = poller.subscribe();
///
/// while states.changed().await.is_ok() {
///     match &*states.borrow() {
///         ConversationState::Connected { messages } => render(messages),
///         state => render_status(state),
///     }
/// }
/// ```
pub struct ConversationPoller {
    counterparty: UserId,
    state_rx: watch::Receiver<ConversationState>,
    sync_now: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConversationPoller {
    /// Spawn a poller for the given conversation.
    ///
    /// Syncs immediately (conversation open), then on every interval tick
    /// and every [`ConversationPoller::sync_now`] nudge. The conversation
    /// is recorded in the roster as a side effect of opening it.
    pub fn spawn(
        engine: Arc<ChatEngine>,
        counterparty: UserId,
        interval: Option<Duration>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConversationState::Loading);
        let sync_now = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Self::poll_loop(
            engine,
            counterparty.clone(),
            interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            state_tx,
            sync_now.clone(),
            cancel.clone(),
        ));

        Self {
            counterparty,
            state_rx,
            sync_now,
            cancel,
            task,
        }
    }

    /// The conversation this poller watches.
    pub fn counterparty(&self) -> &UserId {
        &self.counterparty
    }

    /// Current view state.
    pub fn state(&self) -> ConversationState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver for view-state updates.
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.state_rx.clone()
    }

    /// Request an immediate sync without waiting for the next tick.
    ///
    /// Call after a local send so the echo shows up right away.
    pub fn sync_now(&self) {
        self.sync_now.notify_one();
    }

    /// Stop polling. Any in-flight sync finishes but its result is
    /// discarded.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// True once the background task has exited.
    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    async fn poll_loop(
        engine: Arc<ChatEngine>,
        counterparty: UserId,
        interval: Duration,
        state_tx: watch::Sender<ConversationState>,
        sync_now: Arc<Notify>,
        cancel: CancellationToken,
    ) {
        debug!(%counterparty, ?interval, "Conversation poller started");

        if let Err(e) = engine.remember_conversation(&counterparty).await {
            warn!(%counterparty, error = %e, "Failed to record conversation in roster");
        }

        // First tick completes immediately: sync on conversation open
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = sync_now.notified() => {}
            }

            let outcome = engine.sync(&counterparty).await;

            // The view moved on while we were in flight: discard
            if cancel.is_cancelled() {
                break;
            }

            let state = match outcome {
                Ok(SyncOutcome::Connected { messages }) => {
                    ConversationState::Connected { messages }
                }
                Ok(SyncOutcome::CounterpartyNotConnected) => {
                    ConversationState::CounterpartyNotConnected
                }
                Err(ChatError::KeyUnavailable) => {
                    // Key publication is eventually consistent; stay quiet
                    // and let a later tick retry
                    debug!(%counterparty, "Own keys not available yet");
                    continue;
                }
                Err(e) => {
                    warn!(%counterparty, error = %e, "Sync cycle failed");
                    ConversationState::Failed {
                        message: e.to_string(),
                    }
                }
            };

            state_tx.send_replace(state);
        }

        debug!(%counterparty, "Conversation poller stopped");
    }
}

impl Drop for ConversationPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
