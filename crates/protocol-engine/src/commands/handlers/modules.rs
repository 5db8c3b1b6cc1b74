// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Module commands.
//!
//! Target commands are idempotent: when the requested target is already
//! set, the hardware is not called again.

use std::time::Duration;

use opentrons_hardware::HardwareError;
use tracing::{debug, info};

use super::{CommandContext, CommandOutcome, HandlerResult, validate_range};
use crate::commands::{
    CommandResult, EngageParams, ModuleIdParams, SetShakeSpeedParams,
    SetTargetBlockTemperatureParams, SetTargetTemperatureParams, WaitForTemperatureParams,
};
use crate::error::EngineError;
use crate::state::{HoldTimeTolerance, ModuleTarget, StateChange, StateUpdate};
use crate::types::ModuleType;

const TEMPERATURE_MODULE_RANGE: (f64, f64) = (4.0, 95.0);
const THERMOCYCLER_BLOCK_RANGE: (f64, f64) = (4.0, 99.0);
const HEATER_SHAKER_TEMPERATURE_RANGE: (f64, f64) = (37.0, 95.0);
const HEATER_SHAKER_SPEED_RANGE: (f64, f64) = (200.0, 3000.0);
const MAGNET_HEIGHT_RANGE: (f64, f64) = (0.0, 25.0);

fn target_outcome(module_id: String, target: ModuleTarget, celsius: Option<f64>) -> CommandOutcome {
    let result = match celsius {
        Some(target_celsius) => CommandResult::TargetTemperature { target_celsius },
        None => CommandResult::Empty,
    };
    CommandOutcome::new(
        result,
        StateUpdate::new().with(StateChange::ModuleTarget { module_id, target }),
    )
}

pub(super) async fn temperature_module_set_target(
    params: SetTargetTemperatureParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let module = ctx
        .state
        .modules()
        .get_of_type(&params.module_id, ModuleType::TemperatureModule)?;
    let (min, max) = TEMPERATURE_MODULE_RANGE;
    validate_range("celsius", params.celsius, min, max)?;

    if module.targets.temperature == Some(params.celsius) {
        debug!(module_id = %params.module_id, "Temperature target already set");
    } else {
        ctx.ensure_not_stopped()?;
        ctx.hardware
            .module_set_temperature(&module.serial_number, params.celsius, None)
            .await?;
    }
    Ok(target_outcome(
        params.module_id,
        ModuleTarget::Temperature {
            celsius: params.celsius,
            hold_time_seconds: None,
        },
        Some(params.celsius),
    ))
}

pub(super) async fn temperature_module_wait(
    params: WaitForTemperatureParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let module = ctx
        .state
        .modules()
        .get_of_type(&params.module_id, ModuleType::TemperatureModule)?;
    let target = module
        .targets
        .temperature
        .ok_or_else(|| EngineError::InvalidParams {
            command_type: "temperatureModule/waitForTemperature".to_string(),
            message: format!("module '{}' has no target temperature", params.module_id),
        })?;
    if let Some(celsius) = params.celsius
        && celsius != target
    {
        return Err(EngineError::InvalidParams {
            command_type: "temperatureModule/waitForTemperature".to_string(),
            message: format!("requested {celsius} °C but the target is {target} °C"),
        }
        .into());
    }

    ctx.ensure_not_stopped()?;
    tokio::select! {
        reached = ctx.hardware.module_await_temperature(&module.serial_number) => {
            reached?;
            Ok(CommandOutcome::empty())
        }
        _ = ctx.cancel.cancelled() => Err(EngineError::RunStopped.into()),
    }
}

pub(super) async fn temperature_module_deactivate(
    params: ModuleIdParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let module = ctx
        .state
        .modules()
        .get_of_type(&params.module_id, ModuleType::TemperatureModule)?;
    ctx.ensure_not_stopped()?;
    ctx.hardware.module_deactivate(&module.serial_number).await?;
    Ok(target_outcome(
        params.module_id,
        ModuleTarget::Deactivated,
        None,
    ))
}

/// Set the block temperature and confirm any hold time took effect.
///
/// The read-back of the remaining hold time is compared with
/// [`HoldTimeTolerance`]; a reading outside the window means the module
/// dropped the hold, which is reported as a retryable module fault.
pub(super) async fn thermocycler_set_block_temperature(
    params: SetTargetBlockTemperatureParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let module = ctx
        .state
        .modules()
        .get_of_type(&params.module_id, ModuleType::Thermocycler)?;
    let (min, max) = THERMOCYCLER_BLOCK_RANGE;
    validate_range("celsius", params.celsius, min, max)?;
    let hold = match params.hold_time_seconds {
        Some(seconds) => Some(Duration::try_from_secs_f64(seconds).map_err(|_| {
            EngineError::InvalidParams {
                command_type: "thermocycler/setTargetBlockTemperature".to_string(),
                message: format!("invalid hold time {seconds}s"),
            }
        })?),
        None => None,
    };

    let already_set = module.targets.temperature == Some(params.celsius)
        && module.targets.hold_time_seconds == params.hold_time_seconds;
    if already_set {
        debug!(module_id = %params.module_id, "Block target already set");
    } else {
        let serial = &module.serial_number;
        ctx.ensure_not_stopped()?;
        ctx.hardware
            .module_set_temperature(serial, params.celsius, hold)
            .await?;

        if let Some(hold_time) = params.hold_time_seconds {
            let reading = ctx.hardware.module_status(serial).await?;
            let tolerance = HoldTimeTolerance::new(ctx.config.module_polling_window);
            let confirmed = reading
                .hold_time_remaining
                .is_some_and(|remaining| tolerance.probably_set(hold_time, remaining));
            if !confirmed {
                return Err(HardwareError::ModuleNotResponding {
                    serial: serial.clone(),
                    detail: format!(
                        "hold time read back as {:?}s after setting {}s",
                        reading.hold_time_remaining, hold_time
                    ),
                }
                .into());
            }
        }
        info!(
            module_id = %params.module_id,
            celsius = params.celsius,
            hold_time_seconds = ?params.hold_time_seconds,
            "Thermocycler block target set"
        );
    }

    Ok(target_outcome(
        params.module_id,
        ModuleTarget::Temperature {
            celsius: params.celsius,
            hold_time_seconds: params.hold_time_seconds,
        },
        Some(params.celsius),
    ))
}

pub(super) async fn heater_shaker_set_temperature(
    params: SetTargetTemperatureParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let module = ctx
        .state
        .modules()
        .get_of_type(&params.module_id, ModuleType::HeaterShaker)?;
    let (min, max) = HEATER_SHAKER_TEMPERATURE_RANGE;
    validate_range("celsius", params.celsius, min, max)?;

    if module.targets.temperature != Some(params.celsius) {
        ctx.ensure_not_stopped()?;
        ctx.hardware
            .module_set_temperature(&module.serial_number, params.celsius, None)
            .await?;
    }
    Ok(target_outcome(
        params.module_id,
        ModuleTarget::Temperature {
            celsius: params.celsius,
            hold_time_seconds: None,
        },
        Some(params.celsius),
    ))
}

pub(super) async fn heater_shaker_set_shake_speed(
    params: SetShakeSpeedParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let module = ctx
        .state
        .modules()
        .get_of_type(&params.module_id, ModuleType::HeaterShaker)?;
    let (min, max) = HEATER_SHAKER_SPEED_RANGE;
    validate_range("rpm", params.rpm, min, max)?;

    if module.targets.shake_speed != Some(params.rpm) {
        ctx.ensure_not_stopped()?;
        ctx.hardware
            .set_shake_speed(&module.serial_number, params.rpm.round() as u32)
            .await?;
    }
    Ok(target_outcome(
        params.module_id,
        ModuleTarget::ShakeSpeed { rpm: params.rpm },
        None,
    ))
}

pub(super) async fn magnetic_module_engage(
    params: EngageParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let module = ctx
        .state
        .modules()
        .get_of_type(&params.module_id, ModuleType::MagneticModule)?;
    let (min, max) = MAGNET_HEIGHT_RANGE;
    validate_range("height", params.height, min, max)?;

    if module.targets.magnet_height != Some(params.height) {
        ctx.ensure_not_stopped()?;
        ctx.hardware
            .engage_magnets(&module.serial_number, params.height)
            .await?;
    }
    Ok(target_outcome(
        params.module_id,
        ModuleTarget::MagnetHeight {
            height: params.height,
        },
        None,
    ))
}
