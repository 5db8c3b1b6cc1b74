// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command handlers.
//!
//! One async function per command type. A handler reads the state snapshot
//! it was started with, validates through the views, talks to the hardware
//! and describes what changed as a [`StateUpdate`]. It never dispatches
//! actions itself; the engine loop turns the outcome into a succeed or fail
//! action.
//!
//! Routing is an exhaustive `match` over [`CommandParams`], so adding a
//! command type without a handler does not compile.
//!
//! Stop is cooperative: handlers check the cancellation token before each
//! hardware step and race it only against open-ended waits. A hardware call
//! that has started is allowed to finish.

mod loading;
mod modules;
mod motion;
mod pipetting;

use std::sync::Arc;

use async_trait::async_trait;
use opentrons_hardware::{HardwareControl, HardwareError};
use tokio_util::sync::CancellationToken;

use crate::commands::{CommandParams, CommandResult};
use crate::config::EngineConfig;
use crate::error::{EngineError, InvariantViolation};
use crate::state::{State, StateUpdate};

/// Successful handler outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub result: CommandResult,
    pub state_update: StateUpdate,
}

impl CommandOutcome {
    pub fn new(result: CommandResult, state_update: StateUpdate) -> Self {
        Self {
            result,
            state_update,
        }
    }

    /// No payload and no state change.
    pub fn empty() -> Self {
        Self::new(CommandResult::Empty, StateUpdate::new())
    }
}

/// Failed handler outcome.
///
/// `state_update` holds whatever did happen before the fault, e.g. the
/// gantry reaching the well before an aspirate overpressure.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    pub error: EngineError,
    pub state_update: StateUpdate,
}

impl CommandFailure {
    pub fn with_update(error: impl Into<EngineError>, state_update: StateUpdate) -> Self {
        Self {
            error: error.into(),
            state_update,
        }
    }
}

impl From<EngineError> for CommandFailure {
    fn from(error: EngineError) -> Self {
        Self::with_update(error, StateUpdate::new())
    }
}

impl From<InvariantViolation> for CommandFailure {
    fn from(violation: InvariantViolation) -> Self {
        Self::with_update(violation, StateUpdate::new())
    }
}

impl From<HardwareError> for CommandFailure {
    fn from(error: HardwareError) -> Self {
        Self::with_update(error, StateUpdate::new())
    }
}

pub type HandlerResult = Result<CommandOutcome, CommandFailure>;

/// Run-level controls available to handlers.
#[async_trait]
pub trait RunControl: Send + Sync {
    /// Pause the run and wait until it is played again.
    async fn pause_and_wait(&self, cancel: &CancellationToken) -> Result<(), EngineError>;
}

/// Everything a handler may touch.
#[derive(Clone)]
pub struct CommandContext {
    /// Snapshot taken when the command started.
    pub state: Arc<State>,
    pub hardware: Arc<dyn HardwareControl>,
    /// Cancelled on stop and estop.
    pub cancel: CancellationToken,
    pub config: Arc<EngineConfig>,
    pub run_control: Arc<dyn RunControl>,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("status", &self.state.status())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl CommandContext {
    /// Fail with `RunStopped` once stop has been requested.
    pub fn ensure_not_stopped(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::RunStopped);
        }
        Ok(())
    }
}

/// Execute a command.
pub async fn execute(params: CommandParams, ctx: CommandContext) -> HandlerResult {
    match params {
        CommandParams::Home(p) => motion::home(p, &ctx).await,
        CommandParams::LoadLabware(p) => loading::load_labware(p, &ctx),
        CommandParams::LoadPipette(p) => loading::load_pipette(p, &ctx),
        CommandParams::LoadModule(p) => loading::load_module(p, &ctx).await,
        CommandParams::LoadLiquid(p) => loading::load_liquid(p, &ctx),
        CommandParams::MoveToWell(p) => motion::move_to_well(p, &ctx).await,
        CommandParams::MoveLabware(p) => motion::move_labware(p, &ctx),
        CommandParams::PickUpTip(p) => pipetting::pick_up_tip(p, &ctx).await,
        CommandParams::DropTip(p) => pipetting::drop_tip(p, &ctx).await,
        CommandParams::Aspirate(p) => pipetting::aspirate(p, &ctx).await,
        CommandParams::Dispense(p) => pipetting::dispense(p, &ctx).await,
        CommandParams::BlowOut(p) => pipetting::blow_out(p, &ctx).await,
        CommandParams::LiquidProbe(p) => pipetting::liquid_probe(p, &ctx).await,
        CommandParams::ConfigureNozzleLayout(p) => pipetting::configure_nozzle_layout(p, &ctx),
        CommandParams::WaitForResume(p) => motion::wait_for_resume(p, &ctx).await,
        CommandParams::WaitForDuration(p) => motion::wait_for_duration(p, &ctx).await,
        CommandParams::TemperatureModuleSetTargetTemperature(p) => {
            modules::temperature_module_set_target(p, &ctx).await
        }
        CommandParams::TemperatureModuleWaitForTemperature(p) => {
            modules::temperature_module_wait(p, &ctx).await
        }
        CommandParams::TemperatureModuleDeactivate(p) => {
            modules::temperature_module_deactivate(p, &ctx).await
        }
        CommandParams::ThermocyclerSetTargetBlockTemperature(p) => {
            modules::thermocycler_set_block_temperature(p, &ctx).await
        }
        CommandParams::HeaterShakerSetTargetTemperature(p) => {
            modules::heater_shaker_set_temperature(p, &ctx).await
        }
        CommandParams::HeaterShakerSetAndWaitForShakeSpeed(p) => {
            modules::heater_shaker_set_shake_speed(p, &ctx).await
        }
        CommandParams::MagneticModuleEngage(p) => modules::magnetic_module_engage(p, &ctx).await,
    }
}

fn validate_range(parameter: &str, value: f64, min: f64, max: f64) -> Result<(), EngineError> {
    if !(min..=max).contains(&value) {
        return Err(EngineError::InvalidTarget {
            parameter: parameter.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn new_id(requested: Option<String>) -> String {
    requested.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::actions::{Action, Liquid};
    use crate::commands::{CommandCreate, CommandIntent};
    use crate::state::{StateChange, StateConfig};
    use chrono::Utc;
    use opentrons_hardware::{RobotGeneration, SimulatedHardware};

    pub struct NoopRunControl;

    #[async_trait]
    impl RunControl for NoopRunControl {
        async fn pause_and_wait(&self, _cancel: &CancellationToken) -> Result<(), EngineError> {
            Ok(())
        }
    }

    /// State built by applying changes as if a setup command produced them.
    pub fn state_with(changes: Vec<StateChange>) -> State {
        let state = State::new(StateConfig::default()).handle_action(&Action::AddLiquid {
            liquid: Liquid {
                id: "water".into(),
                display_name: "Water".into(),
                description: String::new(),
            },
        });
        let state = state.handle_action(&Action::QueueCommand {
            command_id: "setup".into(),
            request: CommandCreate::new(crate::commands::HomeParams::default())
                .with_intent(CommandIntent::Setup),
            created_at: Utc::now(),
            priority: false,
        });
        state.handle_action(&Action::SucceedCommand {
            command_id: "setup".into(),
            result: CommandResult::Empty,
            state_update: StateUpdate { changes },
            completed_at: Utc::now(),
        })
    }

    pub fn context(state: State, hardware: Arc<SimulatedHardware>) -> CommandContext {
        CommandContext {
            state: Arc::new(state),
            hardware,
            cancel: CancellationToken::new(),
            config: Arc::new(EngineConfig::default()),
            run_control: Arc::new(NoopRunControl),
        }
    }

    pub fn hardware() -> Arc<SimulatedHardware> {
        Arc::new(SimulatedHardware::new(RobotGeneration::Ot2))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::commands::HomeParams;

    #[tokio::test]
    async fn test_cancelled_context_refuses_hardware() {
        let ctx = context(State::default(), hardware());
        ctx.cancel.cancel();
        let failure = execute(CommandParams::Home(HomeParams::default()), ctx)
            .await
            .unwrap_err();
        assert_eq!(failure.error, EngineError::RunStopped);
    }

    #[test]
    fn test_validate_range_is_inclusive() {
        assert!(validate_range("celsius", 4.0, 4.0, 95.0).is_ok());
        assert!(validate_range("celsius", 95.0, 4.0, 95.0).is_ok());
        let err = validate_range("celsius", 3.9, 4.0, 95.0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TARGET");
    }
}
