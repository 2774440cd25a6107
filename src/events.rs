//! Budget-changed events and the parametric sync watcher.
//!
//! Editing the parametric budget publishes a [`BudgetChanged`] event on a
//! [`BudgetBus`]. A [`ParametricSync`] listener filters events for its own
//! (client, project) pair and asks the backend to re-derive the schedule.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::notifications::Notifier;
use crate::store::{ActivityStore, QueryCache};

/// Wire name of the budget-changed event.
pub const BUDGET_CHANGED_EVENT: &str = "parametric-budget-changed";

/// Default bus capacity before slow subscribers start lagging.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// The parametric budget of one project changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetChanged {
    #[serde(rename = "clienteId")]
    pub client_id: String,
    #[serde(rename = "proyectoId")]
    pub project_id: String,
}

impl BudgetChanged {
    pub fn new(client_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            project_id: project_id.into(),
        }
    }

    pub fn is_for(&self, client_id: &str, project_id: &str) -> bool {
        self.client_id == client_id && self.project_id == project_id
    }
}

/// Fire-and-forget broadcast of budget changes.
#[derive(Debug, Clone)]
pub struct BudgetBus {
    sender: broadcast::Sender<BudgetChanged>,
}

impl Default for BudgetBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl BudgetBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers received it; having
    /// none is not an error.
    pub fn publish(&self, event: BudgetChanged) -> usize {
        tracing::debug!(client = %event.client_id, project = %event.project_id, "{}", BUDGET_CHANGED_EVENT);
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BudgetChanged> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Listener that keeps one project's schedule in sync with its budget.
///
/// The listener task is aborted when the handle is stopped or dropped.
pub struct ParametricSync {
    task: JoinHandle<()>,
    completions: watch::Receiver<u64>,
}

impl ParametricSync {
    /// Subscribe to `bus` and start listening.
    ///
    /// The subscription is taken before this returns, so events published
    /// right after spawning are not missed.
    pub fn spawn<B: Backend>(
        bus: &BudgetBus,
        backend: Arc<B>,
        cache: Arc<QueryCache>,
        notifier: Arc<dyn Notifier>,
        client_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        let client_id = client_id.into();
        let project_id = project_id.into();
        let mut events = bus.subscribe();
        let (done_tx, completions) = watch::channel(0u64);
        let store = ActivityStore::new(backend, cache, notifier);

        let task = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "budget listener lagged, skipping events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !event.is_for(&client_id, &project_id) {
                    continue;
                }
                // Failures are already logged and notified by the store.
                if let Ok(summary) = store.sync(&client_id, &project_id).await {
                    tracing::info!(
                        client = %client_id,
                        project = %project_id,
                        activities = summary.activities,
                        removed = summary.removed,
                        "schedule synchronized"
                    );
                }
                done_tx.send_modify(|n| *n += 1);
            }
        });

        Self { task, completions }
    }

    /// Counter of finished sync attempts, successful or not.
    pub fn completions(&self) -> watch::Receiver<u64> {
        self.completions.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop listening.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ParametricSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}
