// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State store.
//!
//! [`State`] is an immutable snapshot. The only way to change it is
//! [`State::handle_action`], a pure reducer that returns the next snapshot.
//! The reducer does no I/O and never fails: validation happens before an
//! action is dispatched, so anything that reaches the reducer is applied.
//!
//! Read access goes through per-slice views:
//!
//! | View                 | Answers                                       |
//! |----------------------|-----------------------------------------------|
//! | [`State::commands`]  | command records, queue, run status, recovery  |
//! | [`State::labware`]   | loaded labware, definitions, load resolution  |
//! | [`State::pipettes`]  | tips, aspirated volume, working volume        |
//! | [`State::modules`]   | module targets and polled readings            |
//! | [`State::liquids`]   | liquid definitions and tracked well volumes   |
//! | [`State::geometry`]  | deck positions of slots, labware and wells    |

pub mod commands;
pub mod geometry;
pub mod labware;
pub mod liquids;
pub mod modules;
pub mod pipettes;
mod update;

use serde::{Deserialize, Serialize};

use crate::actions::{Action, ActionLogEntry, HardwareEventAction};
use crate::types::RobotGeneration;

pub use commands::{CommandState, EngineStatus, RecoveryAction, RecoveryTarget, RunResult};
pub use geometry::GeometryView;
pub use labware::{LabwareState, LoadedLabware, resolve_load_params};
pub use liquids::{LiquidState, WellLiquid, validate_volume};
pub use modules::{HoldTimeTolerance, LoadedModule, ModuleState, ModuleTargets};
pub use pipettes::{AttachedTip, CurrentWell, LoadedPipette, PipetteState};
pub use update::{FluidChange, ModuleTarget, StateChange, StateUpdate};

/// Run-constant settings the reducer depends on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    pub robot_generation: RobotGeneration,
    pub block_on_door_open: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            robot_generation: RobotGeneration::Ot2,
            block_on_door_open: true,
        }
    }
}

/// Full run state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct State {
    config: StateConfig,
    commands: CommandState,
    labware: LabwareState,
    pipettes: PipetteState,
    modules: ModuleState,
    liquids: LiquidState,
}

impl State {
    pub fn new(config: StateConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Apply an action, returning the next snapshot.
    pub fn handle_action(&self, action: &Action) -> State {
        let mut next = self.clone();
        next.apply(action);
        next
    }

    /// Rebuild a run's state by folding its action log.
    pub fn replay<'a>(
        config: StateConfig,
        entries: impl IntoIterator<Item = &'a ActionLogEntry>,
    ) -> State {
        let mut state = State::new(config);
        for entry in entries {
            state.apply(&entry.action);
        }
        state
    }

    fn apply(&mut self, action: &Action) {
        self.commands.handle_action(action, &self.config);

        match action {
            Action::SucceedCommand { state_update, .. }
            | Action::FailCommand { state_update, .. } => {
                for change in &state_update.changes {
                    self.labware.apply(change);
                    self.pipettes.apply(change);
                    self.modules.apply(change);
                    self.liquids.apply(change);
                }
            }
            Action::AddLabwareDefinition { definition } => self.labware.add_definition(definition),
            Action::AddLiquid { liquid } => self.liquids.add_liquid(liquid),
            Action::Hardware(HardwareEventAction::ModuleStatus { serial, reading }) => {
                self.modules.update_reading(serial, reading)
            }
            _ => {}
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandState {
        &self.commands
    }

    pub fn labware(&self) -> &LabwareState {
        &self.labware
    }

    pub fn pipettes(&self) -> &PipetteState {
        &self.pipettes
    }

    pub fn modules(&self) -> &ModuleState {
        &self.modules
    }

    pub fn liquids(&self) -> &LiquidState {
        &self.liquids
    }

    pub fn geometry(&self) -> GeometryView<'_> {
        GeometryView::new(&self.labware, &self.modules, self.config.robot_generation)
    }

    /// Shorthand for `commands().get_status()`.
    pub fn status(&self) -> EngineStatus {
        self.commands.get_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionLog, ErrorRecoveryType, Liquid};
    use crate::commands::{CommandCreate, CommandResult, LoadLiquidParams};
    use crate::definitions::standard_definition;
    use crate::error::ErrorOccurrence;
    use crate::types::LabwareLocation;
    use chrono::Utc;

    #[test]
    fn test_handle_action_leaves_previous_snapshot_untouched() {
        let before = State::default();
        let after = before.handle_action(&Action::Play {
            requested_at: Utc::now(),
        });
        assert_eq!(before.status(), EngineStatus::Idle);
        assert_eq!(after.status(), EngineStatus::Running);
    }

    #[test]
    fn test_failed_command_applies_partial_update() {
        let state = State::default().handle_action(&Action::FailCommand {
            command_id: "missing".into(),
            error: ErrorOccurrence {
                id: "e".into(),
                created_at: Utc::now(),
                error_type: "Overpressure".into(),
                error_code: "OVERPRESSURE".into(),
                detail: String::new(),
                is_defined: true,
            },
            recovery_type: ErrorRecoveryType::WaitForRecovery,
            state_update: StateUpdate::new().with(StateChange::LoadedLabware {
                labware_id: "plate".into(),
                definition: Box::new(standard_definition("nest_96_wellplate_2ml_deep", 1).unwrap()),
                location: LabwareLocation::slot("2"),
                display_name: None,
            }),
            failed_at: Utc::now(),
        });
        assert!(state.labware().get("plate").is_ok());
    }

    #[test]
    fn test_replay_reproduces_state() {
        let mut log = ActionLog::new();
        let mut live = State::default();
        let actions = vec![
            Action::AddLiquid {
                liquid: Liquid {
                    id: "water".into(),
                    display_name: "Water".into(),
                    description: String::new(),
                },
            },
            Action::QueueCommand {
                command_id: "c1".into(),
                request: CommandCreate::new(LoadLiquidParams {
                    liquid_id: "water".into(),
                    labware_id: "plate".into(),
                    volume_by_well: [("A1".to_string(), 10.0)].into(),
                }),
                created_at: Utc::now(),
                priority: false,
            },
            Action::Play {
                requested_at: Utc::now(),
            },
            Action::RunCommand {
                command_id: "c1".into(),
                started_at: Utc::now(),
            },
            Action::SucceedCommand {
                command_id: "c1".into(),
                result: CommandResult::Empty,
                state_update: StateUpdate::new().with(StateChange::LiquidLoaded {
                    liquid_id: "water".into(),
                    labware_id: "plate".into(),
                    volume_by_well: [("A1".to_string(), 10.0)].into(),
                }),
                completed_at: Utc::now(),
            },
        ];
        for action in actions {
            live = live.handle_action(&action);
            log.append(action);
        }

        let replayed = State::replay(StateConfig::default(), log.entries());
        assert_eq!(replayed, live);
        assert_eq!(replayed.liquids().get_well_volume("plate", "A1"), Some(10.0));
    }
}
