// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tip handling and liquid handling.
//!
//! Every check against tracked volumes happens before the first hardware
//! call, so a rejected aspirate leaves both the pipette and the well as
//! they were.

use opentrons_hardware::HardwareError;
use tracing::{debug, warn};

use super::{CommandContext, CommandFailure, CommandOutcome, HandlerResult};
use crate::commands::{
    BlowOutParams, CommandResult, ConfigureNozzleLayoutParams, DropTipParams, LiquidHandlingParams,
    LiquidProbeParams, PickUpTipParams,
};
use crate::state::{FluidChange, StateChange, StateUpdate};
use crate::types::{Point, WellLocation};

fn location_change(pipette_id: &str, labware_id: &str, well_name: &str) -> StateChange {
    StateChange::PipetteLocation {
        pipette_id: pipette_id.to_string(),
        labware_id: labware_id.to_string(),
        well_name: well_name.to_string(),
    }
}

pub(super) async fn pick_up_tip(params: PickUpTipParams, ctx: &CommandContext) -> HandlerResult {
    let state = &ctx.state;
    let pipette = state.pipettes().get(&params.pipette_id)?;
    state.pipettes().validate_tip_absent(&params.pipette_id)?;
    let tip_length = state.labware().get_tip_length(&params.labware_id)?;
    let tip_volume = state
        .labware()
        .get_definition(&params.labware_id)?
        .tip_volume()
        .unwrap_or(pipette.spec().max_volume);
    let position = state.geometry().get_well_position(
        &params.labware_id,
        &params.well_name,
        &params.well_location,
    )?;
    if state
        .labware()
        .get_has_used_tip(&params.labware_id, &params.well_name)
    {
        warn!(
            labware_id = %params.labware_id,
            well_name = %params.well_name,
            "Picking up from a tip well that was already used"
        );
    }

    ctx.ensure_not_stopped()?;
    ctx.hardware.move_to(pipette.mount, position, None).await?;
    let moved = StateUpdate::new().with(location_change(
        &params.pipette_id,
        &params.labware_id,
        &params.well_name,
    ));
    if let Err(e) = ctx.hardware.pick_up_tip(pipette.mount, tip_length).await {
        // The well is spent either way; a retry must use a different tip.
        let update = moved.with(StateChange::TipsUsed {
            labware_id: params.labware_id.clone(),
            well_names: vec![params.well_name.clone()],
        });
        return Err(CommandFailure::with_update(e, update));
    }

    let update = moved
        .with(StateChange::PipetteTip {
            pipette_id: params.pipette_id.clone(),
            tip: Some((tip_volume, tip_length)),
        })
        .with(StateChange::TipsUsed {
            labware_id: params.labware_id.clone(),
            well_names: vec![params.well_name.clone()],
        });
    Ok(CommandOutcome::new(
        CommandResult::PickUpTip {
            tip_volume,
            tip_length,
            position,
        },
        update,
    ))
}

pub(super) async fn drop_tip(params: DropTipParams, ctx: &CommandContext) -> HandlerResult {
    let state = &ctx.state;
    let pipette = state.pipettes().get(&params.pipette_id)?;
    // A failed pick-up can leave a tip the state does not know about, so
    // ejecting is always allowed.
    if state.pipettes().get_attached_tip(&params.pipette_id)?.is_none() {
        debug!(pipette_id = %params.pipette_id, "No tip tracked; ejecting anyway");
    }

    let mut update = StateUpdate::new();
    let mut position = None;
    if let (Some(labware_id), Some(well_name)) = (&params.labware_id, &params.well_name) {
        let target = state
            .geometry()
            .get_well_position(labware_id, well_name, &WellLocation::default())?;
        ctx.ensure_not_stopped()?;
        ctx.hardware.move_to(pipette.mount, target, None).await?;
        update.push(location_change(&params.pipette_id, labware_id, well_name));
        position = Some(target);
    }

    ctx.ensure_not_stopped()?;
    if let Err(e) = ctx.hardware.drop_tip(pipette.mount).await {
        return Err(CommandFailure::with_update(e, update));
    }
    update.push(StateChange::PipetteTip {
        pipette_id: params.pipette_id,
        tip: None,
    });

    let result = match position {
        Some(position) => CommandResult::Position { position },
        None => CommandResult::Empty,
    };
    Ok(CommandOutcome::new(result, update))
}

/// Plunger faults leave the tip contents unknown; other faults leave them as
/// they were.
fn plunger_failure(error: HardwareError, pipette_id: &str, mut update: StateUpdate) -> CommandFailure {
    if matches!(error, HardwareError::Overpressure { .. }) {
        update.push(StateChange::PipetteFluid {
            pipette_id: pipette_id.to_string(),
            change: FluidChange::Unknown,
        });
    }
    CommandFailure::with_update(error, update)
}

pub(super) async fn aspirate(params: LiquidHandlingParams, ctx: &CommandContext) -> HandlerResult {
    let state = &ctx.state;
    let pipette = state.pipettes().get(&params.pipette_id)?;
    state
        .pipettes()
        .validate_aspirate(&params.pipette_id, params.volume)?;
    state
        .liquids()
        .validate_aspirate_from_well(&params.labware_id, &params.well_name, params.volume)?;
    let position = state.geometry().get_well_position(
        &params.labware_id,
        &params.well_name,
        &params.well_location,
    )?;
    let flow_rate = params
        .flow_rate
        .unwrap_or(pipette.spec().aspirate_flow_rate);

    if pipette.liquid_presence_detection
        && let Some(expected) = state
            .liquids()
            .get_expects_liquid(&params.labware_id, &params.well_name)
    {
        let well_top = state
            .geometry()
            .get_well_top(&params.labware_id, &params.well_name)?;
        ctx.ensure_not_stopped()?;
        let detected = ctx
            .hardware
            .detect_liquid_presence(pipette.mount, well_top)
            .await?;
        if detected != expected {
            return Err(HardwareError::LiquidPresenceMismatch {
                mount: pipette.mount,
                expected,
                detected,
            }
            .into());
        }
    }

    ctx.ensure_not_stopped()?;
    ctx.hardware.move_to(pipette.mount, position, None).await?;
    let moved = StateUpdate::new().with(location_change(
        &params.pipette_id,
        &params.labware_id,
        &params.well_name,
    ));
    if let Err(e) = ctx
        .hardware
        .aspirate(pipette.mount, params.volume, flow_rate)
        .await
    {
        return Err(plunger_failure(e, &params.pipette_id, moved));
    }

    debug!(pipette_id = %params.pipette_id, volume = params.volume, "Aspirated");
    let update = moved
        .with(StateChange::PipetteFluid {
            pipette_id: params.pipette_id.clone(),
            change: FluidChange::Aspirated(params.volume),
        })
        .with(StateChange::WellVolume {
            labware_id: params.labware_id.clone(),
            well_name: params.well_name.clone(),
            delta: -params.volume,
        });
    Ok(CommandOutcome::new(
        CommandResult::Volume {
            volume: params.volume,
            position,
        },
        update,
    ))
}

pub(super) async fn dispense(params: LiquidHandlingParams, ctx: &CommandContext) -> HandlerResult {
    let state = &ctx.state;
    let pipette = state.pipettes().get(&params.pipette_id)?;
    state
        .pipettes()
        .validate_dispense(&params.pipette_id, params.volume)?;
    let capacity = state
        .labware()
        .get_well(&params.labware_id, &params.well_name)?
        .total_liquid_volume;
    state.liquids().validate_dispense_into_well(
        &params.labware_id,
        &params.well_name,
        params.volume,
        capacity,
    )?;
    let position = state.geometry().get_well_position(
        &params.labware_id,
        &params.well_name,
        &params.well_location,
    )?;
    let flow_rate = params
        .flow_rate
        .unwrap_or(pipette.spec().dispense_flow_rate);

    ctx.ensure_not_stopped()?;
    ctx.hardware.move_to(pipette.mount, position, None).await?;
    let moved = StateUpdate::new().with(location_change(
        &params.pipette_id,
        &params.labware_id,
        &params.well_name,
    ));
    if let Err(e) = ctx
        .hardware
        .dispense(pipette.mount, params.volume, flow_rate)
        .await
    {
        return Err(plunger_failure(e, &params.pipette_id, moved));
    }

    let update = moved
        .with(StateChange::PipetteFluid {
            pipette_id: params.pipette_id.clone(),
            change: FluidChange::Dispensed(params.volume),
        })
        .with(StateChange::WellVolume {
            labware_id: params.labware_id.clone(),
            well_name: params.well_name.clone(),
            delta: params.volume,
        });
    Ok(CommandOutcome::new(
        CommandResult::Volume {
            volume: params.volume,
            position,
        },
        update,
    ))
}

pub(super) async fn blow_out(params: BlowOutParams, ctx: &CommandContext) -> HandlerResult {
    let state = &ctx.state;
    let pipette = state.pipettes().get(&params.pipette_id)?;
    state.pipettes().validate_tip_present(&params.pipette_id)?;

    let mut update = StateUpdate::new();
    if let (Some(labware_id), Some(well_name)) = (&params.labware_id, &params.well_name) {
        let top = state.geometry().get_well_top(labware_id, well_name)?;
        ctx.ensure_not_stopped()?;
        ctx.hardware.move_to(pipette.mount, top, None).await?;
        update.push(location_change(&params.pipette_id, labware_id, well_name));
    }

    ctx.ensure_not_stopped()?;
    if let Err(e) = ctx.hardware.blow_out(pipette.mount).await {
        return Err(plunger_failure(e, &params.pipette_id, update));
    }
    update.push(StateChange::PipetteFluid {
        pipette_id: params.pipette_id,
        change: FluidChange::Empty,
    });
    Ok(CommandOutcome::new(CommandResult::Empty, update))
}

pub(super) async fn liquid_probe(params: LiquidProbeParams, ctx: &CommandContext) -> HandlerResult {
    let state = &ctx.state;
    let pipette = state.pipettes().get(&params.pipette_id)?;
    state.pipettes().validate_tip_present(&params.pipette_id)?;
    let top: Point = state
        .geometry()
        .get_well_top(&params.labware_id, &params.well_name)?;

    ctx.ensure_not_stopped()?;
    let surface = ctx.hardware.probe(pipette.mount, top).await?;
    let update = StateUpdate::new().with(location_change(
        &params.pipette_id,
        &params.labware_id,
        &params.well_name,
    ));
    match surface {
        Some(z_position) => Ok(CommandOutcome::new(
            CommandResult::LiquidProbe { z_position },
            update,
        )),
        None => Err(CommandFailure::with_update(
            HardwareError::LiquidNotFound {
                mount: pipette.mount,
            },
            update,
        )),
    }
}

pub(super) fn configure_nozzle_layout(
    params: ConfigureNozzleLayoutParams,
    ctx: &CommandContext,
) -> HandlerResult {
    ctx.state.pipettes().get(&params.pipette_id)?;
    Ok(CommandOutcome::new(
        CommandResult::Empty,
        StateUpdate::new().with(StateChange::NozzleLayout {
            pipette_id: params.pipette_id,
            layout: params.configuration_params,
        }),
    ))
}
