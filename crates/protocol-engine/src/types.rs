// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Value types shared by commands, actions and state.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use opentrons_hardware::{
    DoorState, ModuleModel, ModuleReading, ModuleStatus, ModuleType, Mount, Point, RobotGeneration,
};

/// Where a piece of labware sits.
///
/// Relationships are id references resolved through the state views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LabwareLocation {
    /// Directly in a deck slot.
    Slot {
        /// Deck slot name.
        slot_name: String,
    },
    /// On top of a loaded module.
    Module {
        /// Module id.
        module_id: String,
    },
    /// Stacked on another labware (adapter or lid).
    OnLabware {
        /// Parent labware id.
        labware_id: String,
    },
    /// Removed from the deck.
    OffDeck,
}

impl LabwareLocation {
    /// Shorthand for a deck slot location.
    pub fn slot(name: impl Into<String>) -> Self {
        LabwareLocation::Slot {
            slot_name: name.into(),
        }
    }
}

impl fmt::Display for LabwareLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabwareLocation::Slot { slot_name } => write!(f, "slot {}", slot_name),
            LabwareLocation::Module { module_id } => write!(f, "module '{}'", module_id),
            LabwareLocation::OnLabware { labware_id } => write!(f, "labware '{}'", labware_id),
            LabwareLocation::OffDeck => write!(f, "off-deck"),
        }
    }
}

/// Reference point within a well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WellOrigin {
    /// Top center of the well.
    #[default]
    Top,
    /// Bottom center of the well.
    Bottom,
    /// Geometric center of the well.
    Center,
}

/// Position within a well relative to an origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WellLocation {
    /// Reference point.
    pub origin: WellOrigin,
    /// Offset from the reference point, in mm.
    pub offset: Point,
}

impl WellLocation {
    /// Location at `origin` with a vertical offset.
    pub fn at(origin: WellOrigin, z: f64) -> Self {
        Self {
            origin,
            offset: Point::new(0.0, 0.0, z),
        }
    }
}

/// Active nozzle configuration of a multi-channel pipette.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NozzleLayout {
    /// Every nozzle.
    #[default]
    All,
    /// One nozzle.
    Single {
        /// Nozzle that leads, e.g. `A1`.
        primary_nozzle: String,
    },
    /// One row of nozzles.
    Row {
        /// Nozzle that leads.
        primary_nozzle: String,
    },
    /// One column of nozzles.
    Column {
        /// Nozzle that leads.
        primary_nozzle: String,
    },
}

impl NozzleLayout {
    /// Number of nozzles active for a pipette with `channels` channels.
    pub fn active_channels(&self, channels: u32) -> u32 {
        match self {
            NozzleLayout::All => channels,
            NozzleLayout::Single { .. } => 1,
            NozzleLayout::Row { .. } => channels.min(12),
            NozzleLayout::Column { .. } => channels.min(8),
        }
    }
}

/// Pipette model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipetteName {
    /// P20 single-channel GEN2.
    P20SingleGen2,
    /// P20 8-channel GEN2.
    P20MultiGen2,
    /// P300 single-channel GEN2.
    P300SingleGen2,
    /// P300 8-channel GEN2.
    P300MultiGen2,
    /// P1000 single-channel GEN2.
    P1000SingleGen2,
    /// Flex 1-channel 50 µL.
    P50SingleFlex,
    /// Flex 1-channel 1000 µL.
    P1000SingleFlex,
    /// Flex 8-channel 1000 µL.
    P1000MultiFlex,
    /// Flex 96-channel 1000 µL.
    P1000_96,
}

/// Static properties of a pipette model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipetteSpec {
    /// Maximum plunger volume in µL.
    pub max_volume: f64,
    /// Minimum recommended volume in µL.
    pub min_volume: f64,
    /// Channel count.
    pub channels: u32,
    /// Default aspirate flow rate in µL/s.
    pub aspirate_flow_rate: f64,
    /// Default dispense flow rate in µL/s.
    pub dispense_flow_rate: f64,
    /// Generation the pipette mounts on.
    pub generation: RobotGeneration,
}

impl PipetteName {
    /// Static properties for this model.
    pub fn spec(self) -> PipetteSpec {
        use RobotGeneration::{Flex, Ot2};
        let (max_volume, min_volume, channels, aspirate, dispense, generation) = match self {
            PipetteName::P20SingleGen2 => (20.0, 1.0, 1, 3.78, 7.56, Ot2),
            PipetteName::P20MultiGen2 => (20.0, 1.0, 8, 7.6, 7.6, Ot2),
            PipetteName::P300SingleGen2 => (300.0, 20.0, 1, 46.43, 92.86, Ot2),
            PipetteName::P300MultiGen2 => (300.0, 20.0, 8, 94.0, 94.0, Ot2),
            PipetteName::P1000SingleGen2 => (1000.0, 100.0, 1, 137.35, 274.7, Ot2),
            PipetteName::P50SingleFlex => (50.0, 1.0, 1, 35.0, 57.0, Flex),
            PipetteName::P1000SingleFlex => (1000.0, 5.0, 1, 160.0, 160.0, Flex),
            PipetteName::P1000MultiFlex => (1000.0, 5.0, 8, 160.0, 160.0, Flex),
            PipetteName::P1000_96 => (1000.0, 5.0, 96, 160.0, 160.0, Flex),
        };
        PipetteSpec {
            max_volume,
            min_volume,
            channels,
            aspirate_flow_rate: aspirate,
            dispense_flow_rate: dispense,
            generation,
        }
    }
}
