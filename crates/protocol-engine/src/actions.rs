// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Actions: every mutation of run state.
//!
//! Actions carry all the data the reducer needs, including ids and
//! timestamps, so replaying the action log reproduces the run exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commands::{CommandCreate, CommandResult};
use crate::definitions::LabwareDefinition;
use crate::error::ErrorOccurrence;
use crate::state::StateUpdate;
use crate::types::{DoorState, ModuleReading};

/// What the run does after a command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorRecoveryType {
    /// Fail the run; queued commands are failed with it.
    FailRun,
    /// Enter error recovery and wait for the operator.
    WaitForRecovery,
    /// Record the failure and carry on with the next command.
    IgnoreAndContinue,
}

/// Liquid available to `loadLiquid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liquid {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

/// Hardware event absorbed into state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HardwareEventAction {
    DoorChange { door_state: DoorState },
    EstopEngaged { at: DateTime<Utc> },
    EstopReleased,
    ModuleStatus { serial: String, reading: ModuleReading },
}

/// A state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    /// Add a command to the queue.
    QueueCommand {
        command_id: String,
        request: CommandCreate,
        created_at: DateTime<Utc>,
        /// Inserted via `insert_now`.
        priority: bool,
    },
    /// Command left the queue and started executing.
    RunCommand {
        command_id: String,
        started_at: DateTime<Utc>,
    },
    /// Command finished successfully.
    SucceedCommand {
        command_id: String,
        result: CommandResult,
        state_update: StateUpdate,
        completed_at: DateTime<Utc>,
    },
    /// Command finished with an error.
    FailCommand {
        command_id: String,
        error: ErrorOccurrence,
        recovery_type: ErrorRecoveryType,
        /// Partial changes that happened before the fault.
        state_update: StateUpdate,
        failed_at: DateTime<Utc>,
    },
    Play {
        requested_at: DateTime<Utc>,
    },
    Pause,
    /// Stop requested; the in-flight command is allowed to finish.
    Stop {
        from_estop: bool,
    },
    ResumeFromRecovery,
    /// Client declared the run complete.
    Finish {
        error: Option<ErrorOccurrence>,
    },
    /// Hardware halted after the run ended.
    HardwareStopped {
        completed_at: DateTime<Utc>,
    },
    Hardware(HardwareEventAction),
    AddLabwareDefinition {
        definition: Box<LabwareDefinition>,
    },
    AddLiquid {
        liquid: Liquid,
    },
}

impl Action {
    /// Short name for logs and storage.
    pub fn name(&self) -> &'static str {
        match self {
            Action::QueueCommand { .. } => "queueCommand",
            Action::RunCommand { .. } => "runCommand",
            Action::SucceedCommand { .. } => "succeedCommand",
            Action::FailCommand { .. } => "failCommand",
            Action::Play { .. } => "play",
            Action::Pause => "pause",
            Action::Stop { .. } => "stop",
            Action::ResumeFromRecovery => "resumeFromRecovery",
            Action::Finish { .. } => "finish",
            Action::HardwareStopped { .. } => "hardwareStopped",
            Action::Hardware(_) => "hardware",
            Action::AddLabwareDefinition { .. } => "addLabwareDefinition",
            Action::AddLiquid { .. } => "addLiquid",
        }
    }
}

/// One entry of the append-only action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    /// Position in the log, starting at 1.
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub action: Action,
}

/// Append-only log of dispatched actions.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    entries: Vec<ActionLogEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action, assigning the next sequence number.
    pub fn append(&mut self, action: Action) -> &ActionLogEntry {
        let seq = self.entries.len() as u64 + 1;
        self.entries.push(ActionLogEntry {
            seq,
            recorded_at: Utc::now(),
            action,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ActionLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandParams, HomeParams};

    #[test]
    fn test_log_sequence_numbers_are_monotonic() {
        let mut log = ActionLog::new();
        log.append(Action::Pause);
        log.append(Action::ResumeFromRecovery);
        let seqs: Vec<u64> = log.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, [1, 2]);
    }

    #[test]
    fn test_action_round_trips_through_json() {
        let action = Action::QueueCommand {
            command_id: "c1".into(),
            request: CommandCreate::new(CommandParams::Home(HomeParams::default())),
            created_at: Utc::now(),
            priority: true,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"queueCommand\""));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
