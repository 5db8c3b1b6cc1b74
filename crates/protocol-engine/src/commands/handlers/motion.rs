// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gantry motion, labware moves and waits.

use std::time::Duration;

use opentrons_hardware::Axis;
use tracing::debug;

use super::{CommandContext, CommandOutcome, HandlerResult};
use crate::commands::{
    CommandResult, HomeParams, MoveLabwareParams, MoveToWellParams, WaitForDurationParams,
    WaitForResumeParams,
};
use crate::error::{EngineError, InvariantViolation};
use crate::state::{StateChange, StateUpdate};
use crate::types::LabwareLocation;

pub(super) async fn home(params: HomeParams, ctx: &CommandContext) -> HandlerResult {
    let axes = params.axes.unwrap_or_else(|| Axis::ALL.to_vec());
    ctx.ensure_not_stopped()?;
    ctx.hardware.home(&axes).await?;
    Ok(CommandOutcome::empty())
}

pub(super) async fn move_to_well(params: MoveToWellParams, ctx: &CommandContext) -> HandlerResult {
    let pipette = ctx.state.pipettes().get(&params.pipette_id)?;
    let position = ctx.state.geometry().get_well_position(
        &params.labware_id,
        &params.well_name,
        &params.well_location,
    )?;

    ctx.ensure_not_stopped()?;
    ctx.hardware
        .move_to(pipette.mount, position, params.speed)
        .await?;

    Ok(CommandOutcome::new(
        CommandResult::Position { position },
        StateUpdate::new().with(StateChange::PipetteLocation {
            pipette_id: params.pipette_id,
            labware_id: params.labware_id,
            well_name: params.well_name,
        }),
    ))
}

/// Manual labware move. No hardware involved; the operator relocates it.
pub(super) fn move_labware(params: MoveLabwareParams, ctx: &CommandContext) -> HandlerResult {
    let labware = ctx.state.labware();
    labware.get(&params.labware_id)?;
    validate_destination(ctx, &params.new_location, Some(&params.labware_id))?;

    if let LabwareLocation::OnLabware { labware_id: parent } = &params.new_location
        && labware.is_in_stack_of(parent, &params.labware_id)
    {
        return Err(EngineError::InvalidParams {
            command_type: "moveLabware".to_string(),
            message: format!(
                "cannot stack '{}' on '{}', which rests on it",
                params.labware_id, parent
            ),
        }
        .into());
    }

    debug!(labware_id = %params.labware_id, to = %params.new_location, "Moving labware");
    Ok(CommandOutcome::new(
        CommandResult::Empty,
        StateUpdate::new().with(StateChange::LabwareLocation {
            labware_id: params.labware_id,
            new_location: params.new_location,
        }),
    ))
}

/// Check that `location` exists and is free. `moving` is ignored when it
/// already occupies the location.
pub(super) fn validate_destination(
    ctx: &CommandContext,
    location: &LabwareLocation,
    moving: Option<&str>,
) -> Result<(), InvariantViolation> {
    let state = &ctx.state;
    match location {
        LabwareLocation::Slot { slot_name } => {
            if !state.geometry().has_slot(slot_name) {
                return Err(InvariantViolation::SlotNotFound {
                    slot_name: slot_name.clone(),
                });
            }
            if state.modules().get_in_slot(slot_name).is_some() {
                return Err(InvariantViolation::LocationOccupied {
                    location: location.to_string(),
                });
            }
        }
        LabwareLocation::Module { module_id } => {
            state.modules().get(module_id)?;
        }
        LabwareLocation::OnLabware { labware_id } => {
            state.labware().get(labware_id)?;
        }
        LabwareLocation::OffDeck => return Ok(()),
    }
    match state.labware().get_labware_at(location) {
        Some(occupant) if Some(occupant.id.as_str()) != moving => {
            Err(InvariantViolation::LocationOccupied {
                location: location.to_string(),
            })
        }
        _ => Ok(()),
    }
}

pub(super) async fn wait_for_resume(
    params: WaitForResumeParams,
    ctx: &CommandContext,
) -> HandlerResult {
    debug!(message = params.message.as_deref().unwrap_or(""), "Waiting for resume");
    ctx.run_control.pause_and_wait(&ctx.cancel).await?;
    Ok(CommandOutcome::empty())
}

pub(super) async fn wait_for_duration(
    params: WaitForDurationParams,
    ctx: &CommandContext,
) -> HandlerResult {
    let duration =
        Duration::try_from_secs_f64(params.seconds).map_err(|_| EngineError::InvalidParams {
            command_type: "waitForDuration".to_string(),
            message: format!("invalid duration {}s", params.seconds),
        })?;
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(CommandOutcome::empty()),
        _ = ctx.cancel.cancelled() => Err(EngineError::RunStopped.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::definitions::standard_definition;
    use crate::types::{ModuleModel, Mount, PipetteName, WellLocation};
    use opentrons_hardware::HardwareOperation;

    fn plate(id: &str, location: LabwareLocation) -> StateChange {
        StateChange::LoadedLabware {
            labware_id: id.into(),
            definition: Box::new(standard_definition("corning_96_wellplate_360ul_flat", 1).unwrap()),
            location,
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_move_to_well_records_location() {
        let hw = hardware();
        let ctx = context(
            state_with(vec![
                plate("plate", LabwareLocation::slot("1")),
                StateChange::LoadedPipette {
                    pipette_id: "p".into(),
                    pipette_name: PipetteName::P300SingleGen2,
                    mount: Mount::Left,
                    liquid_presence_detection: false,
                },
            ]),
            hw.clone(),
        );
        let outcome = move_to_well(
            MoveToWellParams {
                pipette_id: "p".into(),
                labware_id: "plate".into(),
                well_name: "A1".into(),
                well_location: WellLocation::default(),
                speed: None,
            },
            &ctx,
        )
        .await
        .unwrap();

        assert!(matches!(outcome.result, CommandResult::Position { .. }));
        assert_eq!(hw.calls(HardwareOperation::MoveTo), 1);
        let state = ctx.state.handle_action(&crate::actions::Action::SucceedCommand {
            command_id: "setup".into(),
            result: outcome.result,
            state_update: outcome.state_update,
            completed_at: chrono::Utc::now(),
        });
        assert_eq!(state.pipettes().get_current_well().unwrap().well_name, "A1");
    }

    #[test]
    fn test_move_labware_rejects_occupied_and_cyclic_destinations() {
        let ctx = context(
            state_with(vec![
                plate("a", LabwareLocation::slot("1")),
                plate("b", LabwareLocation::slot("2")),
                plate(
                    "lid",
                    LabwareLocation::OnLabware {
                        labware_id: "a".into(),
                    },
                ),
            ]),
            hardware(),
        );

        let occupied = move_labware(
            MoveLabwareParams {
                labware_id: "b".into(),
                new_location: LabwareLocation::slot("1"),
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(occupied.error.error_code(), "LOCATION_OCCUPIED");

        let cyclic = move_labware(
            MoveLabwareParams {
                labware_id: "a".into(),
                new_location: LabwareLocation::OnLabware {
                    labware_id: "lid".into(),
                },
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(cyclic.error.error_code(), "INVALID_PARAMS");

        let moved = move_labware(
            MoveLabwareParams {
                labware_id: "b".into(),
                new_location: LabwareLocation::OffDeck,
            },
            &ctx,
        )
        .unwrap();
        assert_eq!(moved.state_update.changes.len(), 1);
    }

    #[test]
    fn test_labware_cannot_go_into_module_slot() {
        let ctx = context(
            state_with(vec![StateChange::LoadedModule {
                module_id: "temp".into(),
                serial: "TM-1".into(),
                model: ModuleModel::TemperatureModuleV2,
                slot_name: "3".into(),
            }]),
            hardware(),
        );
        let err = validate_destination(&ctx, &LabwareLocation::slot("3"), None).unwrap_err();
        assert!(matches!(err, InvariantViolation::LocationOccupied { .. }));
        assert!(
            validate_destination(
                &ctx,
                &LabwareLocation::Module {
                    module_id: "temp".into()
                },
                None
            )
            .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_duration_is_cancellable() {
        let ctx = context(state_with(vec![]), hardware());
        let cancel = ctx.cancel.clone();
        let wait = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                wait_for_duration(
                    WaitForDurationParams {
                        seconds: 600.0,
                        message: None,
                    },
                    &ctx,
                )
                .await
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let failure = wait.await.unwrap().unwrap_err();
        assert_eq!(failure.error, EngineError::RunStopped);
    }
}
