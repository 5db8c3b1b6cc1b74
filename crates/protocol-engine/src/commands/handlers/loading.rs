// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Load commands: labware, pipettes, modules and liquids.

use tracing::info;

use super::motion::validate_destination;
use super::{CommandContext, CommandOutcome, HandlerResult, new_id};
use crate::commands::{
    CommandResult, LoadLabwareParams, LoadLiquidParams, LoadModuleParams, LoadPipetteParams,
};
use crate::error::{EngineError, InvariantViolation};
use crate::state::{StateChange, StateUpdate, validate_volume};
use crate::types::LabwareLocation;

pub(super) fn load_labware(params: LoadLabwareParams, ctx: &CommandContext) -> HandlerResult {
    let labware = ctx.state.labware();
    let (namespace, version) = labware.resolve_load_params(
        &params.load_name,
        params.namespace.as_deref(),
        params.version,
    )?;
    let definition = labware.find_definition(&namespace, &params.load_name, version)?;
    validate_destination(ctx, &params.location, None)?;

    let labware_id = new_id(params.labware_id);
    let definition_uri = definition.uri();
    info!(%labware_id, uri = %definition_uri, location = %params.location, "Loaded labware");

    Ok(CommandOutcome::new(
        CommandResult::LoadLabware {
            labware_id: labware_id.clone(),
            definition_uri,
            location: params.location.clone(),
        },
        StateUpdate::new().with(StateChange::LoadedLabware {
            labware_id,
            definition: Box::new(definition),
            location: params.location,
            display_name: params.display_name,
        }),
    ))
}

pub(super) fn load_pipette(params: LoadPipetteParams, ctx: &CommandContext) -> HandlerResult {
    if ctx.state.pipettes().get_by_mount(params.mount).is_some() {
        return Err(InvariantViolation::MountOccupied {
            mount: params.mount,
        }
        .into());
    }
    let generation = ctx.state.config().robot_generation;
    if params.pipette_name.spec().generation != generation {
        return Err(EngineError::InvalidParams {
            command_type: "loadPipette".to_string(),
            message: format!(
                "{:?} cannot be mounted on a {:?} robot",
                params.pipette_name, generation
            ),
        }
        .into());
    }

    let pipette_id = new_id(params.pipette_id);
    info!(%pipette_id, mount = %params.mount, "Loaded pipette");
    Ok(CommandOutcome::new(
        CommandResult::LoadPipette {
            pipette_id: pipette_id.clone(),
        },
        StateUpdate::new().with(StateChange::LoadedPipette {
            pipette_id,
            pipette_name: params.pipette_name,
            mount: params.mount,
            liquid_presence_detection: params.liquid_presence_detection,
        }),
    ))
}

/// Bind the first attached, not yet loaded module of the requested model.
pub(super) async fn load_module(params: LoadModuleParams, ctx: &CommandContext) -> HandlerResult {
    let slot = LabwareLocation::slot(params.slot_name.clone());
    validate_destination(ctx, &slot, None)?;

    ctx.ensure_not_stopped()?;
    let attached = ctx.hardware.attached_modules().await?;
    let module = attached
        .into_iter()
        .find(|m| m.model == params.model && ctx.state.modules().get_by_serial(&m.serial).is_none())
        .ok_or_else(|| EngineError::ModuleNotAttached {
            model: params.model.to_string(),
        })?;

    let module_id = new_id(params.module_id);
    info!(%module_id, serial = %module.serial, slot = %params.slot_name, "Loaded module");
    Ok(CommandOutcome::new(
        CommandResult::LoadModule {
            module_id: module_id.clone(),
            serial_number: module.serial.clone(),
            model: module.model,
        },
        StateUpdate::new().with(StateChange::LoadedModule {
            module_id,
            serial: module.serial,
            model: module.model,
            slot_name: params.slot_name,
        }),
    ))
}

pub(super) fn load_liquid(params: LoadLiquidParams, ctx: &CommandContext) -> HandlerResult {
    ctx.state.liquids().get_liquid(&params.liquid_id)?;
    for (well_name, volume) in &params.volume_by_well {
        let well = ctx.state.labware().get_well(&params.labware_id, well_name)?;
        validate_volume(*volume)?;
        if *volume > well.total_liquid_volume {
            return Err(InvariantViolation::WellCapacityExceeded {
                labware_id: params.labware_id.clone(),
                well_name: well_name.clone(),
                volume: *volume,
                capacity: well.total_liquid_volume,
            }
            .into());
        }
    }

    Ok(CommandOutcome::new(
        CommandResult::Empty,
        StateUpdate::new().with(StateChange::LiquidLoaded {
            liquid_id: params.liquid_id,
            labware_id: params.labware_id,
            volume_by_well: params.volume_by_well,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::actions::Action;
    use crate::definitions::standard_definition;
    use crate::types::{ModuleModel, Mount, PipetteName};

    #[test]
    fn test_load_labware_resolves_standard_definition() {
        let ctx = context(state_with(vec![]), hardware());
        let outcome = load_labware(
            LoadLabwareParams {
                location: LabwareLocation::slot("1"),
                load_name: "nest_12_reservoir_15ml".into(),
                namespace: None,
                version: None,
                labware_id: Some("res".into()),
                display_name: None,
            },
            &ctx,
        )
        .unwrap();
        assert_eq!(
            outcome.result,
            CommandResult::LoadLabware {
                labware_id: "res".into(),
                definition_uri: "opentrons/nest_12_reservoir_15ml/1".into(),
                location: LabwareLocation::slot("1"),
            }
        );
    }

    #[test]
    fn test_load_labware_ambiguous_custom_definitions() {
        let mut one = standard_definition("nest_12_reservoir_15ml", 1).unwrap();
        one.namespace = "custom_a".into();
        let mut two = one.clone();
        two.namespace = "custom_b".into();
        let state = state_with(vec![])
            .handle_action(&Action::AddLabwareDefinition {
                definition: Box::new(one),
            })
            .handle_action(&Action::AddLabwareDefinition {
                definition: Box::new(two),
            });
        let ctx = context(state, hardware());
        let failure = load_labware(
            LoadLabwareParams {
                location: LabwareLocation::slot("1"),
                load_name: "nest_12_reservoir_15ml".into(),
                namespace: None,
                version: None,
                labware_id: None,
                display_name: None,
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(failure.error.error_code(), "AMBIGUOUS_LOAD_LABWARE_PARAMS");
    }

    #[test]
    fn test_load_labware_unknown_definition() {
        let ctx = context(state_with(vec![]), hardware());
        let failure = load_labware(
            LoadLabwareParams {
                location: LabwareLocation::slot("1"),
                load_name: "no_such_plate".into(),
                namespace: None,
                version: None,
                labware_id: None,
                display_name: None,
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(
            failure.error,
            EngineError::LabwareDefinitionNotFound {
                uri: "opentrons/no_such_plate/1".into()
            }
        );
    }

    #[test]
    fn test_load_pipette_checks_mount_and_generation() {
        let ctx = context(
            state_with(vec![StateChange::LoadedPipette {
                pipette_id: "left".into(),
                pipette_name: PipetteName::P300SingleGen2,
                mount: Mount::Left,
                liquid_presence_detection: false,
            }]),
            hardware(),
        );
        let taken = load_pipette(
            LoadPipetteParams {
                pipette_name: PipetteName::P20SingleGen2,
                mount: Mount::Left,
                pipette_id: None,
                liquid_presence_detection: false,
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(taken.error.error_code(), "MOUNT_OCCUPIED");

        let wrong_robot = load_pipette(
            LoadPipetteParams {
                pipette_name: PipetteName::P1000SingleFlex,
                mount: Mount::Right,
                pipette_id: None,
                liquid_presence_detection: false,
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(wrong_robot.error.error_code(), "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn test_load_module_binds_unused_attached_module() {
        let hw = hardware();
        hw.attach_module("TM-1", ModuleModel::TemperatureModuleV2);
        hw.attach_module("TM-2", ModuleModel::TemperatureModuleV2);
        let ctx = context(
            state_with(vec![StateChange::LoadedModule {
                module_id: "first".into(),
                serial: "TM-1".into(),
                model: ModuleModel::TemperatureModuleV2,
                slot_name: "3".into(),
            }]),
            hw,
        );

        let outcome = load_module(
            LoadModuleParams {
                model: ModuleModel::TemperatureModuleV2,
                slot_name: "6".into(),
                module_id: Some("second".into()),
            },
            &ctx,
        )
        .await
        .unwrap();
        assert!(matches!(
            outcome.result,
            CommandResult::LoadModule { ref serial_number, .. } if serial_number == "TM-2"
        ));

        let missing = load_module(
            LoadModuleParams {
                model: ModuleModel::HeaterShakerModuleV1,
                slot_name: "9".into(),
                module_id: None,
            },
            &ctx,
        )
        .await
        .unwrap_err();
        assert_eq!(missing.error.error_code(), "MODULE_NOT_ATTACHED");
    }

    #[test]
    fn test_load_liquid_validates_wells() {
        let ctx = context(
            state_with(vec![StateChange::LoadedLabware {
                labware_id: "plate".into(),
                definition: Box::new(
                    standard_definition("corning_96_wellplate_360ul_flat", 1).unwrap(),
                ),
                location: LabwareLocation::slot("1"),
                display_name: None,
            }]),
            hardware(),
        );
        let bad_well = load_liquid(
            LoadLiquidParams {
                liquid_id: "water".into(),
                labware_id: "plate".into(),
                volume_by_well: [("Z99".to_string(), 10.0)].into(),
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(bad_well.error.error_code(), "WELL_NOT_FOUND");

        let unknown_liquid = load_liquid(
            LoadLiquidParams {
                liquid_id: "oil".into(),
                labware_id: "plate".into(),
                volume_by_well: [("A1".to_string(), 10.0)].into(),
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(unknown_liquid.error.error_code(), "LIQUID_NOT_DEFINED");

        let nan = load_liquid(
            LoadLiquidParams {
                liquid_id: "water".into(),
                labware_id: "plate".into(),
                volume_by_well: [("A1".to_string(), f64::NAN)].into(),
            },
            &ctx,
        )
        .unwrap_err();
        assert_eq!(nan.error.error_code(), "NON_FINITE_VOLUME");

        assert!(
            load_liquid(
                LoadLiquidParams {
                    liquid_id: "water".into(),
                    labware_id: "plate".into(),
                    volume_by_well: [("A1".to_string(), 100.0)].into(),
                },
                &ctx,
            )
            .is_ok()
        );
    }
}
