//! Command/result correlation over an asynchronous agent channel.
//!
//! Every outgoing [`Command`] gets a fresh id. The reply arrives later on
//! whatever transport is in use and is matched back to the waiting caller by
//! that id. Each pending slot is single-use: once resolved, timed out, or
//! abandoned it is gone, and a late reply for it is logged and dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tabrelay_core::{Action, AgentResult, Command, CommandId, Params};
use tabrelay_logging::{relay_debug, relay_info, relay_warn};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelatorError {
    #[error("agent transport disconnected")]
    Disconnected,
    #[error("no pending command with id {0}")]
    UnknownId(CommandId),
    #[error("command {0} is already being awaited")]
    AlreadyAwaited(CommandId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound channel closed")]
    Closed,
}

/// Outbound half of a transport: hands a command to the agent side.
///
/// Delivery must not block; transports queue internally.
pub trait CommandSink: Send + Sync {
    fn deliver(&self, command: Command) -> Result<(), DeliveryError>;

    /// Called when a command timed out before the agent answered. Transports
    /// that still hold it undelivered may drop it.
    fn withdraw(&self, _id: CommandId) {}
}

struct Slot {
    tx: Option<oneshot::Sender<AgentResult>>,
    rx: Option<oneshot::Receiver<AgentResult>>,
}

struct State {
    next_id: CommandId,
    pending: HashMap<CommandId, Slot>,
}

pub struct Correlator {
    state: Mutex<State>,
    sink: Arc<dyn CommandSink>,
    disconnected: CancellationToken,
}

impl Correlator {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                pending: HashMap::new(),
            }),
            sink,
            disconnected: CancellationToken::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Assign an id, register a pending slot, and hand the command to the transport.
    pub fn send(&self, action: Action, params: Params) -> Result<CommandId, CorrelatorError> {
        self.dispatch(action, params, true)
    }

    /// Like [`send`](Self::send) but without a pending slot; any reply is discarded.
    pub fn notify(&self, action: Action, params: Params) -> Result<CommandId, CorrelatorError> {
        self.dispatch(action, params, false)
    }

    fn dispatch(
        &self,
        action: Action,
        params: Params,
        expects_reply: bool,
    ) -> Result<CommandId, CorrelatorError> {
        if self.is_disconnected() {
            return Err(CorrelatorError::Disconnected);
        }

        let id = {
            let mut state = self.state();
            let id = state.next_id;
            state.next_id += 1;
            if expects_reply {
                let (tx, rx) = oneshot::channel();
                state.pending.insert(
                    id,
                    Slot {
                        tx: Some(tx),
                        rx: Some(rx),
                    },
                );
            }
            id
        };

        relay_debug!("-> command {id} {action}");
        if let Err(err) = self.sink.deliver(Command::new(id, action, params)) {
            relay_warn!("Delivering command {id} failed: {err}");
            self.state().pending.remove(&id);
            self.disconnect();
            return Err(CorrelatorError::Disconnected);
        }
        Ok(id)
    }

    /// Wait for the reply to `id`.
    ///
    /// Returns the agent's result, or a synthetic [`AgentResult::timed_out`]
    /// when nothing arrived within `timeout`. Fails fast once the transport is
    /// disconnected. Dropping the returned future releases the slot and
    /// withdraws the command if it is still undelivered.
    pub async fn await_result(
        &self,
        id: CommandId,
        timeout: Duration,
    ) -> Result<AgentResult, CorrelatorError> {
        if self.is_disconnected() {
            return Err(CorrelatorError::Disconnected);
        }
        let rx = {
            let mut state = self.state();
            let slot = state
                .pending
                .get_mut(&id)
                .ok_or(CorrelatorError::UnknownId(id))?;
            slot.rx.take().ok_or(CorrelatorError::AlreadyAwaited(id))?
        };
        let mut release = SlotRelease {
            correlator: self,
            id,
            answered: false,
        };

        tokio::select! {
            biased;
            outcome = tokio::time::timeout(timeout, rx) => match outcome {
                Ok(Ok(result)) => {
                    release.answered = true;
                    Ok(result)
                }
                Ok(Err(_)) => Err(CorrelatorError::Disconnected),
                Err(_) => {
                    relay_warn!("Command {id} timed out after {timeout:?}");
                    Ok(AgentResult::timed_out(id))
                }
            },
            _ = self.disconnected.cancelled() => Err(CorrelatorError::Disconnected),
        }
    }

    /// Convenience for `send` followed by `await_result`.
    pub async fn call(
        &self,
        action: Action,
        params: Params,
        timeout: Duration,
    ) -> Result<AgentResult, CorrelatorError> {
        let id = self.send(action, params)?;
        self.await_result(id, timeout).await
    }

    /// Route an inbound result to its pending slot. Returns `false` when the
    /// id is unknown or was already resolved.
    pub fn resolve(&self, result: AgentResult) -> bool {
        let id = result.id;
        let tx = self.state().pending.get_mut(&id).and_then(|slot| slot.tx.take());
        match tx {
            Some(tx) => {
                relay_debug!("<- result {id} {:?}", result.status);
                // The waiter may have been dropped in the meantime.
                tx.send(result).is_ok()
            }
            None => {
                relay_debug!("Discarding result for unknown or settled command {id}");
                false
            }
        }
    }

    /// Mark the transport as gone: every pending and future await fails fast.
    pub fn disconnect(&self) {
        if self.disconnected.is_cancelled() {
            return;
        }
        let dropped = {
            let mut state = self.state();
            let dropped = state.pending.len();
            state.pending.clear();
            dropped
        };
        relay_info!("Agent transport disconnected ({dropped} pending commands failed)");
        self.disconnected.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.is_cancelled()
    }

    /// Resolves once the transport disconnects.
    pub async fn disconnected(&self) {
        self.disconnected.cancelled().await
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }
}

/// Frees the pending slot when a wait ends; an unanswered command is also
/// withdrawn from the transport.
struct SlotRelease<'a> {
    correlator: &'a Correlator,
    id: CommandId,
    answered: bool,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.correlator.state().pending.remove(&self.id);
        if !self.answered {
            self.correlator.sink.withdraw(self.id);
        }
    }
}
