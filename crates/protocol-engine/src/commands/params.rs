// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed params for every command type.

use std::collections::BTreeMap;

use opentrons_hardware::Axis;
use serde::{Deserialize, Serialize};

use crate::types::{LabwareLocation, ModuleModel, Mount, NozzleLayout, PipetteName, WellLocation};

/// Params for every command type, tagged by `commandType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "commandType", content = "params")]
pub enum CommandParams {
    #[serde(rename = "home")]
    Home(HomeParams),
    #[serde(rename = "loadLabware")]
    LoadLabware(LoadLabwareParams),
    #[serde(rename = "loadPipette")]
    LoadPipette(LoadPipetteParams),
    #[serde(rename = "loadModule")]
    LoadModule(LoadModuleParams),
    #[serde(rename = "loadLiquid")]
    LoadLiquid(LoadLiquidParams),
    #[serde(rename = "moveToWell")]
    MoveToWell(MoveToWellParams),
    #[serde(rename = "moveLabware")]
    MoveLabware(MoveLabwareParams),
    #[serde(rename = "pickUpTip")]
    PickUpTip(PickUpTipParams),
    #[serde(rename = "dropTip")]
    DropTip(DropTipParams),
    #[serde(rename = "aspirate")]
    Aspirate(LiquidHandlingParams),
    #[serde(rename = "dispense")]
    Dispense(LiquidHandlingParams),
    #[serde(rename = "blowOut")]
    BlowOut(BlowOutParams),
    #[serde(rename = "liquidProbe")]
    LiquidProbe(LiquidProbeParams),
    #[serde(rename = "configureNozzleLayout")]
    ConfigureNozzleLayout(ConfigureNozzleLayoutParams),
    #[serde(rename = "waitForResume", alias = "pause")]
    WaitForResume(WaitForResumeParams),
    #[serde(rename = "waitForDuration")]
    WaitForDuration(WaitForDurationParams),
    #[serde(rename = "temperatureModule/setTargetTemperature")]
    TemperatureModuleSetTargetTemperature(SetTargetTemperatureParams),
    #[serde(rename = "temperatureModule/waitForTemperature")]
    TemperatureModuleWaitForTemperature(WaitForTemperatureParams),
    #[serde(rename = "temperatureModule/deactivate")]
    TemperatureModuleDeactivate(ModuleIdParams),
    #[serde(rename = "thermocycler/setTargetBlockTemperature")]
    ThermocyclerSetTargetBlockTemperature(SetTargetBlockTemperatureParams),
    #[serde(rename = "heaterShaker/setTargetTemperature")]
    HeaterShakerSetTargetTemperature(SetTargetTemperatureParams),
    #[serde(rename = "heaterShaker/setAndWaitForShakeSpeed")]
    HeaterShakerSetAndWaitForShakeSpeed(SetShakeSpeedParams),
    #[serde(rename = "magneticModule/engage")]
    MagneticModuleEngage(EngageParams),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HomeParams {
    /// Axes to home; all when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axes: Option<Vec<Axis>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLabwareParams {
    pub location: LabwareLocation,
    pub load_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Fixed id to assign; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labware_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPipetteParams {
    pub pipette_name: PipetteName,
    pub mount: Mount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipette_id: Option<String>,
    /// Probe for liquid before every aspirate.
    #[serde(default)]
    pub liquid_presence_detection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadModuleParams {
    pub model: ModuleModel,
    pub slot_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLiquidParams {
    pub liquid_id: String,
    pub labware_id: String,
    /// Initial volume per well, in µL.
    pub volume_by_well: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveToWellParams {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
    #[serde(default)]
    pub well_location: WellLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLabwareParams {
    pub labware_id: String,
    pub new_location: LabwareLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickUpTipParams {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
    #[serde(default)]
    pub well_location: WellLocation,
}

/// Drop the tip, optionally after moving into a labware well (tip rack or trash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTipParams {
    pub pipette_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labware_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub well_name: Option<String>,
}

/// Shared by `aspirate` and `dispense`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidHandlingParams {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
    #[serde(default)]
    pub well_location: WellLocation,
    /// Volume in µL.
    pub volume: f64,
    /// µL/s; pipette default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlowOutParams {
    pub pipette_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labware_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub well_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidProbeParams {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureNozzleLayoutParams {
    pub pipette_id: String,
    pub configuration_params: NozzleLayout,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitForResumeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForDurationParams {
    pub seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleIdParams {
    pub module_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTargetTemperatureParams {
    pub module_id: String,
    pub celsius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForTemperatureParams {
    pub module_id: String,
    /// Must match the current target when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTargetBlockTemperatureParams {
    pub module_id: String,
    pub celsius: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetShakeSpeedParams {
    pub module_id: String,
    pub rpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngageParams {
    pub module_id: String,
    /// Magnet height above labware base, in mm.
    pub height: f64,
}

macro_rules! impl_from_params {
    ($($params:ident => $variant:ident),+ $(,)?) => {
        $(
            impl From<$params> for CommandParams {
                fn from(params: $params) -> Self {
                    CommandParams::$variant(params)
                }
            }
        )+
    };
}

impl_from_params! {
    HomeParams => Home,
    LoadLabwareParams => LoadLabware,
    LoadPipetteParams => LoadPipette,
    LoadModuleParams => LoadModule,
    LoadLiquidParams => LoadLiquid,
    MoveToWellParams => MoveToWell,
    MoveLabwareParams => MoveLabware,
    PickUpTipParams => PickUpTip,
    DropTipParams => DropTip,
    BlowOutParams => BlowOut,
    LiquidProbeParams => LiquidProbe,
    ConfigureNozzleLayoutParams => ConfigureNozzleLayout,
    WaitForResumeParams => WaitForResume,
    WaitForDurationParams => WaitForDuration,
    SetTargetBlockTemperatureParams => ThermocyclerSetTargetBlockTemperature,
    SetShakeSpeedParams => HeaterShakerSetAndWaitForShakeSpeed,
    EngageParams => MagneticModuleEngage,
}
