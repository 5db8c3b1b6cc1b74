// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command and run-lifecycle state.
//!
//! Owns every command record, the queue of pending ids, and the run's
//! phase. The public run status is derived, never stored:
//!
//! ```text
//!   idle ──play──► running ◄──play── paused / blocked-by-open-door
//!                    │  ▲
//!          fault     │  │ resume_from_recovery
//!                    ▼  │
//!              awaiting-recovery ◄──play── awaiting-recovery-paused
//!
//!   stop ──► stop-requested ──► stopped
//!   fatal / finish / estop ──► finishing ──► failed | succeeded
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{Action, ErrorRecoveryType, HardwareEventAction};
use crate::commands::{Command, CommandIntent, CommandStatus, CommandType};
use crate::error::{EngineError, ErrorOccurrence};
use crate::queue::{CommandQueue, QueueStatus};
use crate::state::StateConfig;
use crate::types::DoorState;

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunResult {
    Succeeded,
    Failed,
    Stopped,
}

/// Public run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineStatus {
    Idle,
    Running,
    Paused,
    BlockedByOpenDoor,
    AwaitingRecovery,
    AwaitingRecoveryPaused,
    AwaitingRecoveryBlockedByOpenDoor,
    StopRequested,
    Finishing,
    Stopped,
    Failed,
    Succeeded,
}

impl EngineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Running => "running",
            EngineStatus::Paused => "paused",
            EngineStatus::BlockedByOpenDoor => "blocked-by-open-door",
            EngineStatus::AwaitingRecovery => "awaiting-recovery",
            EngineStatus::AwaitingRecoveryPaused => "awaiting-recovery-paused",
            EngineStatus::AwaitingRecoveryBlockedByOpenDoor => {
                "awaiting-recovery-blocked-by-open-door"
            }
            EngineStatus::StopRequested => "stop-requested",
            EngineStatus::Finishing => "finishing",
            EngineStatus::Stopped => "stopped",
            EngineStatus::Failed => "failed",
            EngineStatus::Succeeded => "succeeded",
        }
    }

    /// Whether the run has fully ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineStatus::Stopped | EngineStatus::Failed | EngineStatus::Succeeded
        )
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator choices while awaiting recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryAction {
    RetryFailedCommand,
    SkipFailedCommand,
    UseDifferentTip,
    ManuallyResolveThenResume,
}

/// The failure that put the run into recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryTarget {
    pub command_id: String,
    pub error_id: String,
}

/// Command slice of the run state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandState {
    commands: BTreeMap<String, Command>,
    /// Ids in the order they were queued.
    all_ids: Vec<String>,
    queue: CommandQueue,
    queue_status: QueueStatus,
    running_command_id: Option<String>,
    run_result: Option<RunResult>,
    run_error: Option<ErrorOccurrence>,
    run_started_at: Option<DateTime<Utc>>,
    run_completed_at: Option<DateTime<Utc>>,
    door_state: DoorState,
    is_door_blocking: bool,
    estop_engaged: bool,
    stopped_by_estop: bool,
    recovery_target: Option<RecoveryTarget>,
    /// Errors of commands that sent the run into recovery.
    failed_command_errors: Vec<ErrorOccurrence>,
}

impl CommandState {
    pub(crate) fn handle_action(&mut self, action: &Action, config: &StateConfig) {
        match action {
            Action::QueueCommand {
                command_id,
                request,
                created_at,
                priority,
            } => {
                let command = Command {
                    id: command_id.clone(),
                    key: request.key.clone().unwrap_or_else(|| command_id.clone()),
                    params: request.params.clone(),
                    intent: request.intent,
                    status: CommandStatus::Queued,
                    result: None,
                    error: None,
                    created_at: *created_at,
                    started_at: None,
                    completed_at: None,
                    failed_command_id: None,
                };
                self.commands.insert(command_id.clone(), command);
                self.all_ids.push(command_id.clone());
                if *priority {
                    self.queue.insert_now(command_id.clone());
                } else {
                    self.queue.enqueue(command_id.clone(), request.intent);
                }
            }
            Action::RunCommand {
                command_id,
                started_at,
            } => {
                self.queue.remove(command_id);
                if let Some(command) = self.commands.get_mut(command_id) {
                    command.status = CommandStatus::Running;
                    command.started_at = Some(*started_at);
                }
                self.running_command_id = Some(command_id.clone());
            }
            Action::SucceedCommand {
                command_id,
                result,
                completed_at,
                ..
            } => {
                if let Some(command) = self.commands.get_mut(command_id) {
                    command.status = CommandStatus::Succeeded;
                    command.result = Some(result.clone());
                    command.completed_at = Some(*completed_at);
                }
                self.clear_running(command_id);
            }
            Action::FailCommand {
                command_id,
                error,
                recovery_type,
                failed_at,
                ..
            } => self.fail_command(command_id, error, *recovery_type, *failed_at),
            Action::Play { requested_at } => {
                if self.run_started_at.is_none() {
                    self.run_started_at = Some(*requested_at);
                }
                self.queue_status = match self.queue_status {
                    QueueStatus::Setup | QueueStatus::Paused => QueueStatus::Running,
                    QueueStatus::AwaitingRecoveryPaused => QueueStatus::AwaitingRecovery,
                    other => other,
                };
            }
            Action::Pause => self.pause(),
            Action::Stop { from_estop } => {
                if self.run_result.is_none() {
                    self.run_result = Some(if *from_estop {
                        RunResult::Failed
                    } else {
                        RunResult::Stopped
                    });
                    self.stopped_by_estop = *from_estop;
                    self.recovery_target = None;
                }
            }
            Action::ResumeFromRecovery => {
                if self.queue_status == QueueStatus::AwaitingRecovery {
                    self.queue_status = QueueStatus::Running;
                }
                self.recovery_target = None;
            }
            Action::Finish { error } => {
                if self.run_result.is_none() {
                    self.run_result = Some(if error.is_some() {
                        RunResult::Failed
                    } else {
                        RunResult::Succeeded
                    });
                }
                if self.run_error.is_none() {
                    self.run_error = error.clone();
                }
            }
            Action::HardwareStopped { completed_at } => {
                if self.run_completed_at.is_none() {
                    self.run_completed_at = Some(*completed_at);
                }
            }
            Action::Hardware(event) => match event {
                HardwareEventAction::DoorChange { door_state } => {
                    self.door_state = *door_state;
                    if *door_state == DoorState::Open && config.block_on_door_open {
                        self.is_door_blocking = true;
                        self.pause();
                    } else {
                        self.is_door_blocking = false;
                    }
                }
                HardwareEventAction::EstopEngaged { .. } => self.estop_engaged = true,
                HardwareEventAction::EstopReleased => self.estop_engaged = false,
                HardwareEventAction::ModuleStatus { .. } => {}
            },
            Action::AddLabwareDefinition { .. } | Action::AddLiquid { .. } => {}
        }
    }

    fn pause(&mut self) {
        self.queue_status = match self.queue_status {
            QueueStatus::Running => QueueStatus::Paused,
            QueueStatus::AwaitingRecovery => QueueStatus::AwaitingRecoveryPaused,
            other => other,
        };
    }

    fn clear_running(&mut self, command_id: &str) {
        if self.running_command_id.as_deref() == Some(command_id) {
            self.running_command_id = None;
        }
    }

    fn fail_command(
        &mut self,
        command_id: &str,
        error: &ErrorOccurrence,
        recovery_type: ErrorRecoveryType,
        failed_at: DateTime<Utc>,
    ) {
        self.queue.remove(command_id);
        let intent = self.commands.get_mut(command_id).map(|command| {
            command.status = CommandStatus::Failed;
            command.error = Some(error.clone());
            command.completed_at = Some(failed_at);
            command.intent
        });
        self.clear_running(command_id);

        match recovery_type {
            ErrorRecoveryType::FailRun => {
                if self.run_result.is_some() {
                    return;
                }
                self.run_result = Some(RunResult::Failed);
                self.run_error = Some(error.clone());
                self.recovery_target = None;
                for queued_id in self.queue.drain() {
                    if let Some(command) = self.commands.get_mut(&queued_id) {
                        command.status = CommandStatus::Failed;
                        command.error = Some(error.clone());
                        command.completed_at = Some(failed_at);
                        command.failed_command_id = Some(command_id.to_string());
                    }
                }
            }
            ErrorRecoveryType::WaitForRecovery => {
                self.failed_command_errors.push(error.clone());
                if intent != Some(CommandIntent::Fixit) || self.recovery_target.is_none() {
                    self.recovery_target = Some(RecoveryTarget {
                        command_id: command_id.to_string(),
                        error_id: error.id.clone(),
                    });
                }
                self.queue_status = match self.queue_status {
                    QueueStatus::Paused | QueueStatus::AwaitingRecoveryPaused => {
                        QueueStatus::AwaitingRecoveryPaused
                    }
                    _ if self.is_door_blocking => QueueStatus::AwaitingRecoveryPaused,
                    _ => QueueStatus::AwaitingRecovery,
                };
            }
            ErrorRecoveryType::IgnoreAndContinue => {}
        }
    }

    // ---- queries ----

    pub fn get(&self, command_id: &str) -> Result<&Command, EngineError> {
        self.commands
            .get(command_id)
            .ok_or_else(|| EngineError::CommandNotFound {
                command_id: command_id.to_string(),
            })
    }

    /// Every command in queue order.
    pub fn get_all(&self) -> impl Iterator<Item = &Command> {
        self.all_ids.iter().filter_map(|id| self.commands.get(id))
    }

    pub fn get_by_key(&self, key: &str) -> Option<&Command> {
        self.get_all().find(|command| command.key == key)
    }

    pub fn get_queued_ids(&self) -> Vec<&str> {
        self.queue.ids().collect()
    }

    pub fn get_running_command_id(&self) -> Option<&str> {
        self.running_command_id.as_deref()
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        self.queue_status
    }

    pub fn get_run_result(&self) -> Option<RunResult> {
        self.run_result
    }

    pub fn get_run_error(&self) -> Option<&ErrorOccurrence> {
        self.run_error.as_ref()
    }

    pub fn get_run_started_at(&self) -> Option<DateTime<Utc>> {
        self.run_started_at
    }

    pub fn get_run_completed_at(&self) -> Option<DateTime<Utc>> {
        self.run_completed_at
    }

    pub fn get_door_state(&self) -> DoorState {
        self.door_state
    }

    pub fn get_is_door_blocking(&self) -> bool {
        self.is_door_blocking
    }

    pub fn get_stopped_by_estop(&self) -> bool {
        self.stopped_by_estop
    }

    pub fn get_failed_command_errors(&self) -> &[ErrorOccurrence] {
        &self.failed_command_errors
    }

    pub fn get_recovery_target(&self) -> Option<&RecoveryTarget> {
        self.recovery_target.as_ref()
    }

    /// Command whose failure put the run into recovery.
    pub fn get_recovery_target_command(&self) -> Option<&Command> {
        self.recovery_target
            .as_ref()
            .and_then(|target| self.commands.get(&target.command_id))
    }

    /// Derived public status.
    pub fn get_status(&self) -> EngineStatus {
        match self.run_result {
            Some(RunResult::Stopped) if self.run_completed_at.is_none() => {
                EngineStatus::StopRequested
            }
            Some(RunResult::Stopped) => EngineStatus::Stopped,
            Some(_) if self.run_completed_at.is_none() => EngineStatus::Finishing,
            Some(RunResult::Failed) => EngineStatus::Failed,
            Some(RunResult::Succeeded) => EngineStatus::Succeeded,
            None => match self.queue_status {
                QueueStatus::Setup => EngineStatus::Idle,
                QueueStatus::Running => EngineStatus::Running,
                QueueStatus::Paused if self.is_door_blocking => EngineStatus::BlockedByOpenDoor,
                QueueStatus::Paused => EngineStatus::Paused,
                QueueStatus::AwaitingRecovery => EngineStatus::AwaitingRecovery,
                QueueStatus::AwaitingRecoveryPaused if self.is_door_blocking => {
                    EngineStatus::AwaitingRecoveryBlockedByOpenDoor
                }
                QueueStatus::AwaitingRecoveryPaused => EngineStatus::AwaitingRecoveryPaused,
            },
        }
    }

    pub fn get_is_running(&self) -> bool {
        self.run_result.is_none() && self.queue_status == QueueStatus::Running
    }

    fn is_awaiting_recovery(&self) -> bool {
        matches!(
            self.queue_status,
            QueueStatus::AwaitingRecovery | QueueStatus::AwaitingRecoveryPaused
        )
    }

    /// Next command the engine loop may start, if any.
    pub fn get_next_to_execute(&self) -> Result<Option<&str>, EngineError> {
        if self.run_result.is_some() {
            return Err(EngineError::RunStopped);
        }
        if self.running_command_id.is_some() {
            return Ok(None);
        }
        Ok(self.queue.get_next(self.queue_status))
    }

    /// Nothing running and nothing that could start now.
    pub fn get_is_settled(&self) -> bool {
        self.running_command_id.is_none()
            && (self.run_result.is_some() || self.queue.get_next(self.queue_status).is_none())
    }

    /// Recovery actions offered to the operator.
    pub fn get_recovery_actions(&self) -> Vec<RecoveryAction> {
        if self.run_result.is_some() || !self.is_awaiting_recovery() {
            return Vec::new();
        }
        let mut actions = vec![
            RecoveryAction::RetryFailedCommand,
            RecoveryAction::SkipFailedCommand,
        ];
        if self
            .get_recovery_target_command()
            .is_some_and(|command| command.command_type() == CommandType::PickUpTip)
        {
            actions.push(RecoveryAction::UseDifferentTip);
        }
        actions.push(RecoveryAction::ManuallyResolveThenResume);
        actions
    }

    /// Reject actions the run cannot accept in its current phase.
    pub fn validate_action_allowed(&self, action: &Action) -> Result<(), EngineError> {
        match action {
            Action::QueueCommand { request, .. } => {
                if self.run_result.is_some() {
                    return Err(EngineError::RunStopped);
                }
                match request.intent {
                    CommandIntent::Setup if self.queue_status != QueueStatus::Setup => {
                        Err(EngineError::SetupCommandNotAllowed {
                            command_type: request.command_type().to_string(),
                        })
                    }
                    CommandIntent::Fixit if !self.is_awaiting_recovery() => {
                        Err(EngineError::FixitCommandNotAllowed {
                            command_type: request.command_type().to_string(),
                        })
                    }
                    _ => Ok(()),
                }
            }
            Action::Play { .. } => {
                if self.run_result.is_some() {
                    return Err(EngineError::RunStopped);
                }
                if self.is_door_blocking {
                    return Err(EngineError::RobotDoorOpen);
                }
                Ok(())
            }
            Action::Pause => {
                let status = self.get_status();
                if status != EngineStatus::Running {
                    return Err(EngineError::PauseNotAllowed {
                        status: status.to_string(),
                    });
                }
                Ok(())
            }
            Action::ResumeFromRecovery => {
                if self.run_result.is_some() || self.queue_status != QueueStatus::AwaitingRecovery
                {
                    return Err(EngineError::ResumeFromRecoveryNotAllowed {
                        reason: format!("run is {}", self.get_status()),
                    });
                }
                if self.queue.has_priority() || self.running_command_id.is_some() {
                    return Err(EngineError::ResumeFromRecoveryNotAllowed {
                        reason: "recovery commands are still queued or running".to_string(),
                    });
                }
                Ok(())
            }
            Action::Stop { .. } | Action::Finish { .. } => {
                if self.run_completed_at.is_some() {
                    return Err(EngineError::RunConflict {
                        reason: "the run has already completed".to_string(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandCreate, CommandParams, CommandResult, HomeParams};
    use crate::state::StateUpdate;

    fn config() -> StateConfig {
        StateConfig::default()
    }

    fn apply(state: &mut CommandState, action: Action) {
        state.handle_action(&action, &config());
    }

    fn queue(state: &mut CommandState, id: &str, intent: CommandIntent) {
        apply(
            state,
            Action::QueueCommand {
                command_id: id.into(),
                request: CommandCreate::new(CommandParams::Home(HomeParams::default()))
                    .with_intent(intent),
                created_at: Utc::now(),
                priority: false,
            },
        );
    }

    fn error(id: &str) -> ErrorOccurrence {
        ErrorOccurrence {
            id: id.into(),
            created_at: Utc::now(),
            error_type: "TipPickupFailed".into(),
            error_code: "TIP_PICKUP_FAILED".into(),
            detail: "boom".into(),
            is_defined: true,
        }
    }

    fn run(state: &mut CommandState, id: &str) {
        apply(
            state,
            Action::RunCommand {
                command_id: id.into(),
                started_at: Utc::now(),
            },
        );
    }

    fn fail(state: &mut CommandState, id: &str, recovery_type: ErrorRecoveryType) {
        apply(
            state,
            Action::FailCommand {
                command_id: id.into(),
                error: error("e1"),
                recovery_type,
                state_update: StateUpdate::new(),
                failed_at: Utc::now(),
            },
        );
    }

    fn play(state: &mut CommandState) {
        apply(
            state,
            Action::Play {
                requested_at: Utc::now(),
            },
        );
    }

    #[test]
    fn test_status_lifecycle() {
        let mut state = CommandState::default();
        assert_eq!(state.get_status(), EngineStatus::Idle);
        play(&mut state);
        assert_eq!(state.get_status(), EngineStatus::Running);
        apply(&mut state, Action::Pause);
        assert_eq!(state.get_status(), EngineStatus::Paused);
        play(&mut state);
        apply(&mut state, Action::Stop { from_estop: false });
        assert_eq!(state.get_status(), EngineStatus::StopRequested);
        apply(
            &mut state,
            Action::HardwareStopped {
                completed_at: Utc::now(),
            },
        );
        assert_eq!(state.get_status(), EngineStatus::Stopped);
        assert!(state.get_status().is_terminal());
    }

    #[test]
    fn test_command_status_moves_forward() {
        let mut state = CommandState::default();
        queue(&mut state, "a", CommandIntent::Protocol);
        assert_eq!(state.get("a").unwrap().status, CommandStatus::Queued);
        play(&mut state);
        assert_eq!(state.get_next_to_execute().unwrap(), Some("a"));
        run(&mut state, "a");
        assert_eq!(state.get("a").unwrap().status, CommandStatus::Running);
        assert_eq!(state.get_next_to_execute().unwrap(), None);
        apply(
            &mut state,
            Action::SucceedCommand {
                command_id: "a".into(),
                result: CommandResult::Empty,
                state_update: StateUpdate::new(),
                completed_at: Utc::now(),
            },
        );
        let command = state.get("a").unwrap();
        assert_eq!(command.status, CommandStatus::Succeeded);
        assert!(command.started_at.is_some() && command.completed_at.is_some());
        assert!(state.get_is_settled());
    }

    #[test]
    fn test_fail_run_fails_queued_commands() {
        let mut state = CommandState::default();
        for id in ["a", "b", "c"] {
            queue(&mut state, id, CommandIntent::Protocol);
        }
        play(&mut state);
        run(&mut state, "a");
        fail(&mut state, "a", ErrorRecoveryType::FailRun);

        assert_eq!(state.get_status(), EngineStatus::Finishing);
        for id in ["b", "c"] {
            let command = state.get(id).unwrap();
            assert_eq!(command.status, CommandStatus::Failed);
            assert_eq!(command.failed_command_id.as_deref(), Some("a"));
        }
        assert!(matches!(
            state.get_next_to_execute(),
            Err(EngineError::RunStopped)
        ));
    }

    #[test]
    fn test_wait_for_recovery_and_resume() {
        let mut state = CommandState::default();
        apply(
            &mut state,
            Action::QueueCommand {
                command_id: "tip".into(),
                request: CommandCreate::new(crate::commands::PickUpTipParams {
                    pipette_id: "p".into(),
                    labware_id: "tips".into(),
                    well_name: "A1".into(),
                    well_location: Default::default(),
                }),
                created_at: Utc::now(),
                priority: false,
            },
        );
        queue(&mut state, "next", CommandIntent::Protocol);
        play(&mut state);
        run(&mut state, "tip");
        fail(&mut state, "tip", ErrorRecoveryType::WaitForRecovery);

        assert_eq!(state.get_status(), EngineStatus::AwaitingRecovery);
        assert_eq!(state.get_next_to_execute().unwrap(), None);
        assert!(
            state
                .get_recovery_actions()
                .contains(&RecoveryAction::UseDifferentTip)
        );

        queue(&mut state, "fix", CommandIntent::Fixit);
        assert!(
            state
                .validate_action_allowed(&Action::ResumeFromRecovery)
                .is_err()
        );
        assert_eq!(state.get_next_to_execute().unwrap(), Some("fix"));
        run(&mut state, "fix");
        apply(
            &mut state,
            Action::SucceedCommand {
                command_id: "fix".into(),
                result: CommandResult::Empty,
                state_update: StateUpdate::new(),
                completed_at: Utc::now(),
            },
        );
        assert!(
            state
                .validate_action_allowed(&Action::ResumeFromRecovery)
                .is_ok()
        );
        apply(&mut state, Action::ResumeFromRecovery);
        assert_eq!(state.get_status(), EngineStatus::Running);
        assert_eq!(state.get_next_to_execute().unwrap(), Some("next"));
        assert!(state.get_recovery_actions().is_empty());
    }

    #[test]
    fn test_door_blocks_and_unblocks() {
        let mut state = CommandState::default();
        play(&mut state);
        apply(
            &mut state,
            Action::Hardware(HardwareEventAction::DoorChange {
                door_state: DoorState::Open,
            }),
        );
        assert_eq!(state.get_status(), EngineStatus::BlockedByOpenDoor);
        assert!(matches!(
            state.validate_action_allowed(&Action::Play {
                requested_at: Utc::now()
            }),
            Err(EngineError::RobotDoorOpen)
        ));

        apply(
            &mut state,
            Action::Hardware(HardwareEventAction::DoorChange {
                door_state: DoorState::Closed,
            }),
        );
        assert_eq!(state.get_status(), EngineStatus::Paused);
        play(&mut state);
        assert_eq!(state.get_status(), EngineStatus::Running);
    }

    #[test]
    fn test_door_ignored_when_not_blocking() {
        let config = StateConfig {
            block_on_door_open: false,
            ..StateConfig::default()
        };
        let mut state = CommandState::default();
        state.handle_action(
            &Action::Play {
                requested_at: Utc::now(),
            },
            &config,
        );
        state.handle_action(
            &Action::Hardware(HardwareEventAction::DoorChange {
                door_state: DoorState::Open,
            }),
            &config,
        );
        assert_eq!(state.get_status(), EngineStatus::Running);
        assert_eq!(state.get_door_state(), DoorState::Open);
    }

    #[test]
    fn test_phase_validation() {
        let mut state = CommandState::default();
        let setup = Action::QueueCommand {
            command_id: "s".into(),
            request: CommandCreate::new(HomeParams::default()).with_intent(CommandIntent::Setup),
            created_at: Utc::now(),
            priority: false,
        };
        let fixit = Action::QueueCommand {
            command_id: "f".into(),
            request: CommandCreate::new(HomeParams::default()).with_intent(CommandIntent::Fixit),
            created_at: Utc::now(),
            priority: false,
        };
        assert!(state.validate_action_allowed(&setup).is_ok());
        assert!(matches!(
            state.validate_action_allowed(&fixit),
            Err(EngineError::FixitCommandNotAllowed { .. })
        ));
        assert!(matches!(
            state.validate_action_allowed(&Action::Pause),
            Err(EngineError::PauseNotAllowed { .. })
        ));

        play(&mut state);
        assert!(matches!(
            state.validate_action_allowed(&setup),
            Err(EngineError::SetupCommandNotAllowed { .. })
        ));

        apply(&mut state, Action::Stop { from_estop: false });
        assert!(matches!(
            state.validate_action_allowed(&setup),
            Err(EngineError::RunStopped)
        ));
        apply(
            &mut state,
            Action::HardwareStopped {
                completed_at: Utc::now(),
            },
        );
        assert!(matches!(
            state.validate_action_allowed(&Action::Stop { from_estop: false }),
            Err(EngineError::RunConflict { .. })
        ));
    }

    #[test]
    fn test_estop_fails_run() {
        let mut state = CommandState::default();
        play(&mut state);
        apply(&mut state, Action::Stop { from_estop: true });
        assert_eq!(state.get_run_result(), Some(RunResult::Failed));
        assert!(state.get_stopped_by_estop());
        assert_eq!(state.get_status(), EngineStatus::Finishing);
    }

    #[test]
    fn test_stop_leaves_queued_commands_queued() {
        let mut state = CommandState::default();
        queue(&mut state, "a", CommandIntent::Protocol);
        queue(&mut state, "b", CommandIntent::Protocol);
        play(&mut state);
        run(&mut state, "a");
        apply(&mut state, Action::Stop { from_estop: false });
        apply(
            &mut state,
            Action::SucceedCommand {
                command_id: "a".into(),
                result: CommandResult::Empty,
                state_update: StateUpdate::new(),
                completed_at: Utc::now(),
            },
        );
        assert_eq!(state.get("b").unwrap().status, CommandStatus::Queued);
        assert!(state.get_is_settled());
    }
}
