// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action dispatcher.
//!
//! Single writer of run state. Each dispatched action is, in order:
//!
//! 1. reduced into a new [`State`] snapshot,
//! 2. published to snapshot watchers,
//! 3. appended to the action log,
//! 4. turned into [`Notification`]s for pub/sub observers,
//! 5. passed to registered [`ActionHandler`]s.
//!
//! The dispatcher is owned by the engine task; nothing else mutates state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::actions::{Action, ActionLog, ActionLogEntry, HardwareEventAction};
use crate::state::{EngineStatus, State};

/// Notification topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationEvent {
    CommandRunning,
    CommandComplete,
    DoorState,
    RunStatus,
}

/// Change notification: `{event, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub data: serde_json::Value,
}

/// Subscriber that sees every action after it has been applied.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, entry: &ActionLogEntry, state: &State);
}

/// Owns the state, the action log and the subscriber lists.
pub struct ActionDispatcher {
    state: Arc<State>,
    log: ActionLog,
    snapshots: watch::Sender<Arc<State>>,
    notifications: broadcast::Sender<Notification>,
    handlers: Vec<Box<dyn ActionHandler>>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("actions", &self.log.len())
            .field("handlers", &self.handlers.len())
            .field("status", &self.state.status())
            .finish()
    }
}

impl ActionDispatcher {
    /// Create a dispatcher and the receiver for its snapshots.
    pub fn new(
        initial: State,
        notifications: broadcast::Sender<Notification>,
    ) -> (Self, watch::Receiver<Arc<State>>) {
        let state = Arc::new(initial);
        let (snapshots, snapshot_rx) = watch::channel(state.clone());
        (
            Self {
                state,
                log: ActionLog::new(),
                snapshots,
                notifications,
                handlers: Vec::new(),
            },
            snapshot_rx,
        )
    }

    pub fn add_handler(&mut self, handler: Box<dyn ActionHandler>) {
        self.handlers.push(handler);
    }

    /// Current snapshot.
    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Apply an action and fan it out. Returns the new snapshot.
    pub fn dispatch(&mut self, action: Action) -> Arc<State> {
        let previous_status = self.state.status();
        let next = Arc::new(self.state.handle_action(&action));
        self.state = next.clone();
        self.snapshots.send_replace(next.clone());

        let entry = self.log.append(action);
        debug!(seq = entry.seq, action = entry.action.name(), "Dispatched action");

        for notification in notifications_for(&entry.action, previous_status, &next) {
            // No receivers is fine; observers come and go.
            let _ = self.notifications.send(notification);
        }
        for handler in &self.handlers {
            handler.handle(entry, &next);
        }
        next
    }
}

fn notifications_for(action: &Action, previous_status: EngineStatus, state: &State) -> Vec<Notification> {
    let mut out = Vec::new();

    let command_event = match action {
        Action::RunCommand { command_id, .. } => {
            Some((NotificationEvent::CommandRunning, command_id))
        }
        Action::SucceedCommand { command_id, .. } | Action::FailCommand { command_id, .. } => {
            Some((NotificationEvent::CommandComplete, command_id))
        }
        _ => None,
    };
    if let Some((event, command_id)) = command_event
        && let Ok(command) = state.commands().get(command_id)
    {
        match serde_json::to_value(command) {
            Ok(data) => out.push(Notification { event, data }),
            Err(e) => warn!(error = %e, %command_id, "Failed to serialize command notification"),
        }
    }

    if let Action::Hardware(HardwareEventAction::DoorChange { door_state }) = action {
        out.push(Notification {
            event: NotificationEvent::DoorState,
            data: json!({
                "doorState": door_state,
                "blocking": state.commands().get_is_door_blocking(),
            }),
        });
    }

    let status = state.status();
    if status != previous_status {
        out.push(Notification {
            event: NotificationEvent::RunStatus,
            data: json!({
                "status": status,
                "previous": previous_status,
                "recoveryActions": state.commands().get_recovery_actions(),
            }),
        });
    }
    out
}
