// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};

use crate::types::{LabwareLocation, ModuleModel, Point};

/// Result payload of a succeeded command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CommandResult {
    /// No payload.
    Empty,
    /// `loadLabware`.
    LoadLabware {
        labware_id: String,
        definition_uri: String,
        location: LabwareLocation,
    },
    /// `loadPipette`.
    LoadPipette { pipette_id: String },
    /// `loadModule`.
    LoadModule {
        module_id: String,
        serial_number: String,
        model: ModuleModel,
    },
    /// Final critical-point position after a move.
    Position { position: Point },
    /// `pickUpTip`.
    PickUpTip {
        tip_volume: f64,
        tip_length: f64,
        position: Point,
    },
    /// `aspirate` and `dispense`.
    Volume { volume: f64, position: Point },
    /// `liquidProbe`.
    LiquidProbe { z_position: f64 },
    /// Module target commands.
    TargetTemperature { target_celsius: f64 },
}
