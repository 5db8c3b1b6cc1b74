// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State changes produced by command handlers.
//!
//! Handlers never touch the store. They describe what changed as a
//! [`StateUpdate`], which travels inside the succeed/fail action and is
//! applied by the reducer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::definitions::LabwareDefinition;
use crate::types::{LabwareLocation, ModuleModel, Mount, NozzleLayout, PipetteName};

/// Aspirated-fluid change on a pipette.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "volume", rename_all = "camelCase")]
pub enum FluidChange {
    /// Volume drawn into the tip.
    Aspirated(f64),
    /// Volume pushed out of the tip.
    Dispensed(f64),
    /// Tip is empty.
    Empty,
    /// Contents can no longer be trusted.
    Unknown,
}

/// Module target change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ModuleTarget {
    /// Temperature target, with an optional hold in seconds.
    Temperature {
        celsius: f64,
        hold_time_seconds: Option<f64>,
    },
    /// Heater-shaker speed.
    ShakeSpeed { rpm: f64 },
    /// Magnet height.
    MagnetHeight { height: f64 },
    /// Everything off.
    Deactivated,
}

/// One change to run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StateChange {
    LoadedLabware {
        labware_id: String,
        definition: Box<LabwareDefinition>,
        location: LabwareLocation,
        display_name: Option<String>,
    },
    LabwareLocation {
        labware_id: String,
        new_location: LabwareLocation,
    },
    LoadedPipette {
        pipette_id: String,
        pipette_name: PipetteName,
        mount: Mount,
        liquid_presence_detection: bool,
    },
    PipetteTip {
        pipette_id: String,
        /// `(tip_volume, tip_length)` when attached.
        tip: Option<(f64, f64)>,
    },
    PipetteFluid {
        pipette_id: String,
        change: FluidChange,
    },
    PipetteLocation {
        pipette_id: String,
        labware_id: String,
        well_name: String,
    },
    NozzleLayout {
        pipette_id: String,
        layout: NozzleLayout,
    },
    TipsUsed {
        labware_id: String,
        well_names: Vec<String>,
    },
    LiquidLoaded {
        liquid_id: String,
        labware_id: String,
        volume_by_well: BTreeMap<String, f64>,
    },
    WellVolume {
        labware_id: String,
        well_name: String,
        /// Positive adds, negative removes.
        delta: f64,
    },
    LoadedModule {
        module_id: String,
        serial: String,
        model: ModuleModel,
        slot_name: String,
    },
    ModuleTarget {
        module_id: String,
        target: ModuleTarget,
    },
}

/// Ordered batch of changes from one command.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    pub changes: Vec<StateChange>,
}

impl StateUpdate {
    /// No changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change.
    pub fn with(mut self, change: StateChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Append a change in place.
    pub fn push(&mut self, change: StateChange) {
        self.changes.push(change);
    }

    /// Whether there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
