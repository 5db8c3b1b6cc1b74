// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run history: durable copies of the action log.
//!
//! The engine never awaits storage. A [`HistoryTap`] registered on the
//! dispatcher copies each entry onto an unbounded channel and a writer task
//! spawned by [`spawn_writer`] drains it into a [`RunHistory`]. A failed write
//! is logged and skipped; the in-memory log stays authoritative.

mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::actions::ActionLogEntry;
use crate::dispatcher::ActionHandler;
use crate::error::Result;
use crate::state::State;

pub use sqlite::SqliteRunHistory;

/// Storage for action logs, keyed by run id.
#[async_trait]
pub trait RunHistory: Send + Sync {
    /// Append one entry. Entries arrive in sequence order.
    async fn append(&self, run_id: &str, entry: &ActionLogEntry) -> Result<()>;

    /// All entries of a run in sequence order. Unknown runs are empty.
    async fn load(&self, run_id: &str) -> Result<Vec<ActionLogEntry>>;
}

/// Run history kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRunHistory {
    runs: Mutex<HashMap<String, Vec<ActionLogEntry>>>,
}

impl InMemoryRunHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunHistory for InMemoryRunHistory {
    async fn append(&self, run_id: &str, entry: &ActionLogEntry) -> Result<()> {
        self.runs
            .lock()
            .entry(run_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Vec<ActionLogEntry>> {
        Ok(self.runs.lock().get(run_id).cloned().unwrap_or_default())
    }
}

/// Dispatcher handler that copies entries to the history writer.
#[derive(Debug)]
pub struct HistoryTap {
    sender: mpsc::UnboundedSender<ActionLogEntry>,
}

impl HistoryTap {
    pub fn new(sender: mpsc::UnboundedSender<ActionLogEntry>) -> Self {
        Self { sender }
    }
}

impl ActionHandler for HistoryTap {
    fn handle(&self, entry: &ActionLogEntry, _state: &State) {
        if self.sender.send(entry.clone()).is_err() {
            warn!(seq = entry.seq, "History writer has exited; entry not persisted");
        }
    }
}

/// Spawn the task that persists tapped entries. It exits once every
/// [`HistoryTap`] for `receiver` has been dropped and the backlog is written.
pub fn spawn_writer(
    history: Arc<dyn RunHistory>,
    run_id: String,
    mut receiver: mpsc::UnboundedReceiver<ActionLogEntry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(entry) = receiver.recv().await {
            match history.append(&run_id, &entry).await {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    %run_id,
                    seq = entry.seq,
                    error = %e,
                    error_code = e.error_code(),
                    "Failed to persist action"
                ),
            }
        }
        debug!(%run_id, written, "History writer finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionLog};
    use crate::dispatcher::ActionDispatcher;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_writer_drains_tap_into_history() {
        let history = Arc::new(InMemoryRunHistory::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = spawn_writer(history.clone(), "run-1".into(), rx);

        let (notify, _) = broadcast::channel(4);
        let (mut dispatcher, _snapshots) = ActionDispatcher::new(State::default(), notify);
        dispatcher.add_handler(Box::new(HistoryTap::new(tx)));
        dispatcher.dispatch(Action::Pause);
        dispatcher.dispatch(Action::Stop { from_estop: false });
        drop(dispatcher);
        writer.await.unwrap();

        let entries = history.load("run-1").await.unwrap();
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, [1, 2]);
        assert!(history.load("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_history_keeps_runs_apart() {
        let history = InMemoryRunHistory::new();
        let mut log = ActionLog::new();
        let entry = log.append(Action::Pause).clone();
        history.append("a", &entry).await.unwrap();
        history.append("b", &entry).await.unwrap();
        history.append("b", &entry).await.unwrap();
        assert_eq!(history.load("a").await.unwrap().len(), 1);
        assert_eq!(history.load("b").await.unwrap().len(), 2);
    }
}
