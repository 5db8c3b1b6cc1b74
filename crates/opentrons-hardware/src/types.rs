// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared value types for the hardware interface.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipette mount on the gantry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    /// Left pipette mount.
    Left,
    /// Right pipette mount.
    Right,
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mount::Left => write!(f, "left"),
            Mount::Right => write!(f, "right"),
        }
    }
}

/// Motion axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Gantry X.
    X,
    /// Gantry Y.
    Y,
    /// Left mount Z.
    ZLeft,
    /// Right mount Z.
    ZRight,
    /// Left plunger.
    PLeft,
    /// Right plunger.
    PRight,
}

impl Axis {
    /// Every axis, in homing order.
    pub const ALL: [Axis; 6] = [
        Axis::ZLeft,
        Axis::ZRight,
        Axis::X,
        Axis::Y,
        Axis::PLeft,
        Axis::PRight,
    ];

    /// Z axis that carries the given mount.
    pub fn z_for(mount: Mount) -> Self {
        match mount {
            Mount::Left => Axis::ZLeft,
            Mount::Right => Axis::ZRight,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::ZLeft => "Z_L",
            Axis::ZRight => "Z_R",
            Axis::PLeft => "P_L",
            Axis::PRight => "P_R",
        };
        f.write_str(name)
    }
}

/// Deck coordinate in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Point {
    /// Create a point.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum.
    pub fn offset(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

/// Robot hardware generation, selected once at construction.
///
/// Generation-specific behaviour is expressed as capabilities on this tag
/// rather than as separate driver types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotGeneration {
    /// OT-2 (Smoothie motion controller, numbered deck slots).
    #[default]
    Ot2,
    /// Flex (CAN motion controller, coordinate deck slots, door interlock).
    Flex,
}

const OT2_SLOTS: [&str; 12] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12",
];

const FLEX_SLOTS: [&str; 12] = [
    "D1", "D2", "D3", "C1", "C2", "C3", "B1", "B2", "B3", "A1", "A2", "A3",
];

impl RobotGeneration {
    /// Whether motion must be refused while the front door is open.
    pub fn requires_door_interlock(self) -> bool {
        matches!(self, RobotGeneration::Flex)
    }

    /// Deck slot names, ordered from front-left to back-right.
    pub fn deck_slots(self) -> &'static [&'static str] {
        match self {
            RobotGeneration::Ot2 => &OT2_SLOTS,
            RobotGeneration::Flex => &FLEX_SLOTS,
        }
    }

    /// Maximum gantry speed in mm/s.
    pub fn max_speed(self) -> f64 {
        match self {
            RobotGeneration::Ot2 => 400.0,
            RobotGeneration::Flex => 500.0,
        }
    }
}

impl fmt::Display for RobotGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobotGeneration::Ot2 => write!(f, "ot2"),
            RobotGeneration::Flex => write!(f, "flex"),
        }
    }
}

impl std::str::FromStr for RobotGeneration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ot2" | "ot-2" | "ot-2 standard" => Ok(RobotGeneration::Ot2),
            "flex" | "ot-3" | "ot-3 standard" => Ok(RobotGeneration::Flex),
            other => Err(format!("unknown robot type '{}'", other)),
        }
    }
}

/// Front door state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorState {
    /// Door closed.
    #[default]
    Closed,
    /// Door open.
    Open,
}

/// Hardware model of a pluggable module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleModel {
    /// Temperature module GEN2.
    #[serde(rename = "temperatureModuleV2")]
    TemperatureModuleV2,
    /// Magnetic module GEN2.
    #[serde(rename = "magneticModuleV2")]
    MagneticModuleV2,
    /// Thermocycler GEN2.
    #[serde(rename = "thermocyclerModuleV2")]
    ThermocyclerModuleV2,
    /// Heater-shaker GEN1.
    #[serde(rename = "heaterShakerModuleV1")]
    HeaterShakerModuleV1,
}

/// Module family, independent of hardware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleType {
    /// Temperature module.
    TemperatureModule,
    /// Magnetic module.
    MagneticModule,
    /// Thermocycler.
    Thermocycler,
    /// Heater-shaker.
    HeaterShaker,
}

impl ModuleModel {
    /// Module family for this model.
    pub fn module_type(self) -> ModuleType {
        match self {
            ModuleModel::TemperatureModuleV2 => ModuleType::TemperatureModule,
            ModuleModel::MagneticModuleV2 => ModuleType::MagneticModule,
            ModuleModel::ThermocyclerModuleV2 => ModuleType::Thermocycler,
            ModuleModel::HeaterShakerModuleV1 => ModuleType::HeaterShaker,
        }
    }

    /// Height of the labware seating surface above the deck, in mm.
    pub fn labware_offset_z(self) -> f64 {
        match self {
            ModuleModel::TemperatureModuleV2 => 9.0,
            ModuleModel::MagneticModuleV2 => 4.5,
            ModuleModel::ThermocyclerModuleV2 => 108.96,
            ModuleModel::HeaterShakerModuleV1 => 68.275,
        }
    }
}

impl fmt::Display for ModuleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleModel::TemperatureModuleV2 => "temperatureModuleV2",
            ModuleModel::MagneticModuleV2 => "magneticModuleV2",
            ModuleModel::ThermocyclerModuleV2 => "thermocyclerModuleV2",
            ModuleModel::HeaterShakerModuleV1 => "heaterShakerModuleV1",
        };
        f.write_str(name)
    }
}

/// Live module status as reported by the module's own poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// No target set.
    #[default]
    Idle,
    /// Moving up toward the target.
    Heating,
    /// Moving down toward the target.
    Cooling,
    /// At target.
    Holding,
}

/// One polled reading from a module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReading {
    /// Live status.
    pub status: ModuleStatus,
    /// Target temperature, if one is set.
    pub target_temperature: Option<f64>,
    /// Last measured temperature.
    pub current_temperature: Option<f64>,
    /// Remaining hold time in seconds, if a hold is active.
    pub hold_time_remaining: Option<f64>,
    /// Current shake speed in rpm (heater-shaker only).
    pub shake_speed: Option<u32>,
    /// Magnet height in mm (magnetic module only).
    pub magnet_height: Option<f64>,
}

/// A module found on the USB bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedModule {
    /// Serial number.
    pub serial: String,
    /// Hardware model.
    pub model: ModuleModel,
}

/// Hardware operation identifier, used for fault injection and journaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HardwareOperation {
    /// Home axes.
    Home,
    /// Gantry move.
    MoveTo,
    /// Liquid-level probe.
    Probe,
    /// Tip pick-up.
    PickUpTip,
    /// Tip drop.
    DropTip,
    /// Plunger aspirate.
    Aspirate,
    /// Plunger dispense.
    Dispense,
    /// Blow-out.
    BlowOut,
    /// Module temperature set.
    ModuleSetTemperature,
    /// Module temperature wait.
    ModuleAwaitTemperature,
    /// Module deactivate.
    ModuleDeactivate,
    /// Module status read.
    ModuleStatus,
    /// Heater-shaker speed set.
    SetShakeSpeed,
    /// Magnet engage.
    EngageMagnets,
    /// Halt motion.
    Halt,
}

impl fmt::Display for HardwareOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HardwareOperation::Home => "home",
            HardwareOperation::MoveTo => "move_to",
            HardwareOperation::Probe => "probe",
            HardwareOperation::PickUpTip => "pick_up_tip",
            HardwareOperation::DropTip => "drop_tip",
            HardwareOperation::Aspirate => "aspirate",
            HardwareOperation::Dispense => "dispense",
            HardwareOperation::BlowOut => "blow_out",
            HardwareOperation::ModuleSetTemperature => "module_set_temperature",
            HardwareOperation::ModuleAwaitTemperature => "module_await_temperature",
            HardwareOperation::ModuleDeactivate => "module_deactivate",
            HardwareOperation::ModuleStatus => "module_status",
            HardwareOperation::SetShakeSpeed => "set_shake_speed",
            HardwareOperation::EngageMagnets => "engage_magnets",
            HardwareOperation::Halt => "halt",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_capabilities() {
        assert!(RobotGeneration::Flex.requires_door_interlock());
        assert!(!RobotGeneration::Ot2.requires_door_interlock());
        assert_eq!(RobotGeneration::Ot2.deck_slots()[0], "1");
        assert_eq!(RobotGeneration::Flex.deck_slots()[0], "D1");
    }

    #[test]
    fn test_generation_from_str() {
        assert_eq!("OT-2".parse::<RobotGeneration>(), Ok(RobotGeneration::Ot2));
        assert_eq!("flex".parse::<RobotGeneration>(), Ok(RobotGeneration::Flex));
        assert!("ot-1".parse::<RobotGeneration>().is_err());
    }

    #[test]
    fn test_module_model_wire_names() {
        let json = serde_json::to_string(&ModuleModel::HeaterShakerModuleV1).unwrap();
        assert_eq!(json, "\"heaterShakerModuleV1\"");
        assert_eq!(
            ModuleModel::ThermocyclerModuleV2.module_type(),
            ModuleType::Thermocycler
        );
    }
}
