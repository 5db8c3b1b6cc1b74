// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Labware definitions.
//!
//! Definitions are static geometry consumed as data. Custom definitions
//! arrive as JSON (see [`LabwareDefinition::from_json`]); a small set of
//! standard `opentrons` definitions is generated on demand by
//! [`standard_definition`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Namespace of definitions shipped with the robot.
pub const STANDARD_NAMESPACE: &str = "opentrons";

/// Footprint shared by SBS-format labware.
const FOOTPRINT_X: f64 = 127.76;
const FOOTPRINT_Y: f64 = 85.48;

/// Labware geometry definition (subset of the Opentrons labware schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareDefinition {
    pub namespace: String,
    pub version: u32,
    pub parameters: LabwareParameters,
    #[serde(default)]
    pub metadata: LabwareMetadata,
    pub dimensions: LabwareDimensions,
    pub wells: BTreeMap<String, WellDefinition>,
    /// Wells grouped by column, front to back.
    #[serde(default)]
    pub ordering: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareParameters {
    pub load_name: String,
    #[serde(default)]
    pub is_tiprack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_length: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabwareMetadata {
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareDimensions {
    pub x_dimension: f64,
    pub y_dimension: f64,
    pub z_dimension: f64,
}

/// One well. `x`/`y`/`z` locate the well's bottom center relative to the
/// labware's front-left-bottom corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellDefinition {
    pub depth: f64,
    pub total_liquid_volume: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LabwareDefinition {
    /// `namespace/loadName/version`.
    pub fn uri(&self) -> String {
        definition_uri(&self.namespace, &self.parameters.load_name, self.version)
    }

    /// Load name.
    pub fn load_name(&self) -> &str {
        &self.parameters.load_name
    }

    /// Look up a well.
    pub fn well(&self, name: &str) -> Option<&WellDefinition> {
        self.wells.get(name)
    }

    /// Tip volume for a tip rack, taken from its wells.
    pub fn tip_volume(&self) -> Option<f64> {
        if !self.parameters.is_tiprack {
            return None;
        }
        self.wells.values().next().map(|w| w.total_liquid_volume)
    }

    /// Parse a definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text).map_err(|e| EngineError::InvalidParams {
            command_type: "labwareDefinition".to_string(),
            message: e.to_string(),
        })
    }

    /// Load every `*.json` definition in a directory, sorted by file name.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, EngineError> {
        let io_err = |e: std::io::Error| EngineError::Persistence {
            operation: "read_labware_dir".to_string(),
            details: format!("{}: {}", dir.display(), e),
        };
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                let text = std::fs::read_to_string(path).map_err(io_err)?;
                Self::from_json(&text)
            })
            .collect()
    }
}

/// Format a definition URI.
pub fn definition_uri(namespace: &str, load_name: &str, version: u32) -> String {
    format!("{}/{}/{}", namespace, load_name, version)
}

struct GridSpec {
    load_name: &'static str,
    display_name: &'static str,
    rows: usize,
    columns: usize,
    pitch_x: f64,
    pitch_y: f64,
    well_volume: f64,
    well_depth: f64,
    height: f64,
    tip_length: Option<f64>,
    versions: &'static [u32],
}

const STANDARD_LABWARE: &[GridSpec] = &[
    GridSpec {
        load_name: "opentrons_96_tiprack_20ul",
        display_name: "Opentrons 96 Tip Rack 20 µL",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 20.0,
        well_depth: 39.2,
        height: 64.69,
        tip_length: Some(39.2),
        versions: &[1],
    },
    GridSpec {
        load_name: "opentrons_96_tiprack_300ul",
        display_name: "Opentrons 96 Tip Rack 300 µL",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 300.0,
        well_depth: 59.3,
        height: 64.49,
        tip_length: Some(59.3),
        versions: &[1],
    },
    GridSpec {
        load_name: "opentrons_96_tiprack_1000ul",
        display_name: "Opentrons 96 Tip Rack 1000 µL",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 1000.0,
        well_depth: 88.0,
        height: 97.47,
        tip_length: Some(88.0),
        versions: &[1],
    },
    GridSpec {
        load_name: "opentrons_flex_96_tiprack_50ul",
        display_name: "Opentrons Flex 96 Tip Rack 50 µL",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 50.0,
        well_depth: 57.9,
        height: 99.0,
        tip_length: Some(57.9),
        versions: &[1],
    },
    GridSpec {
        load_name: "opentrons_flex_96_tiprack_1000ul",
        display_name: "Opentrons Flex 96 Tip Rack 1000 µL",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 1000.0,
        well_depth: 95.6,
        height: 99.0,
        tip_length: Some(95.6),
        versions: &[1],
    },
    GridSpec {
        load_name: "nest_12_reservoir_15ml",
        display_name: "NEST 12 Well Reservoir 15 mL",
        rows: 1,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 0.0,
        well_volume: 15_000.0,
        well_depth: 26.85,
        height: 31.4,
        tip_length: None,
        versions: &[1],
    },
    GridSpec {
        load_name: "nest_1_reservoir_195ml",
        display_name: "NEST 1 Well Reservoir 195 mL",
        rows: 1,
        columns: 1,
        pitch_x: 0.0,
        pitch_y: 0.0,
        well_volume: 195_000.0,
        well_depth: 25.0,
        height: 31.4,
        tip_length: None,
        versions: &[1],
    },
    GridSpec {
        load_name: "corning_96_wellplate_360ul_flat",
        display_name: "Corning 96 Well Plate 360 µL Flat",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 360.0,
        well_depth: 10.67,
        height: 14.22,
        tip_length: None,
        versions: &[1, 2],
    },
    GridSpec {
        load_name: "nest_96_wellplate_100ul_pcr_full_skirt",
        display_name: "NEST 96 Well Plate 100 µL PCR Full Skirt",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 100.0,
        well_depth: 14.78,
        height: 15.7,
        tip_length: None,
        versions: &[1, 2],
    },
    GridSpec {
        load_name: "nest_96_wellplate_2ml_deep",
        display_name: "NEST 96 Deep Well Plate 2 mL",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 2000.0,
        well_depth: 38.0,
        height: 41.0,
        tip_length: None,
        versions: &[1, 2],
    },
    GridSpec {
        load_name: "opentrons_24_aluminumblock_generic_2ml_screwcap",
        display_name: "Opentrons 24 Well Aluminum Block with Generic 2 mL Screwcap",
        rows: 4,
        columns: 6,
        pitch_x: 17.25,
        pitch_y: 17.25,
        well_volume: 2000.0,
        well_depth: 42.0,
        height: 63.88,
        tip_length: None,
        versions: &[1, 2],
    },
    GridSpec {
        load_name: "opentrons_96_aluminumblock_generic_pcr_strip_200ul",
        display_name: "Opentrons 96 Well Aluminum Block with Generic PCR Strip 200 µL",
        rows: 8,
        columns: 12,
        pitch_x: 9.0,
        pitch_y: 9.0,
        well_volume: 200.0,
        well_depth: 20.2,
        height: 30.5,
        tip_length: None,
        versions: &[1, 2],
    },
];

/// Build a standard definition, if `load_name` at `version` is known.
pub fn standard_definition(load_name: &str, version: u32) -> Option<LabwareDefinition> {
    let grid = STANDARD_LABWARE
        .iter()
        .find(|grid| grid.load_name == load_name)?;
    if !grid.versions.contains(&version) {
        return None;
    }

    let span_x = grid.pitch_x * (grid.columns - 1) as f64;
    let span_y = grid.pitch_y * (grid.rows - 1) as f64;
    let first_x = (FOOTPRINT_X - span_x) / 2.0;
    let back_y = (FOOTPRINT_Y + span_y) / 2.0;
    let bottom_z = grid.height - grid.well_depth;

    let mut wells = BTreeMap::new();
    let mut ordering = Vec::with_capacity(grid.columns);
    for column in 0..grid.columns {
        let mut column_wells = Vec::with_capacity(grid.rows);
        for row in 0..grid.rows {
            let name = format!("{}{}", (b'A' + row as u8) as char, column + 1);
            wells.insert(
                name.clone(),
                WellDefinition {
                    depth: grid.well_depth,
                    total_liquid_volume: grid.well_volume,
                    x: first_x + grid.pitch_x * column as f64,
                    y: back_y - grid.pitch_y * row as f64,
                    z: bottom_z,
                },
            );
            column_wells.push(name);
        }
        ordering.push(column_wells);
    }

    Some(LabwareDefinition {
        namespace: STANDARD_NAMESPACE.to_string(),
        version,
        parameters: LabwareParameters {
            load_name: grid.load_name.to_string(),
            is_tiprack: grid.tip_length.is_some(),
            tip_length: grid.tip_length,
        },
        metadata: LabwareMetadata {
            display_name: grid.display_name.to_string(),
        },
        dimensions: LabwareDimensions {
            x_dimension: FOOTPRINT_X,
            y_dimension: FOOTPRINT_Y,
            z_dimension: grid.height,
        },
        wells,
        ordering,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_reservoir_layout() {
        let def = standard_definition("nest_12_reservoir_15ml", 1).unwrap();
        assert_eq!(def.uri(), "opentrons/nest_12_reservoir_15ml/1");
        assert_eq!(def.wells.len(), 12);
        assert_eq!(def.ordering.len(), 12);
        let a1 = def.well("A1").unwrap();
        let a12 = def.well("A12").unwrap();
        assert!((a12.x - a1.x - 99.0).abs() < 1e-9);
        assert_eq!(a1.total_liquid_volume, 15_000.0);
        assert!(def.tip_volume().is_none());
    }

    #[test]
    fn test_standard_tiprack() {
        let def = standard_definition("opentrons_96_tiprack_300ul", 1).unwrap();
        assert!(def.parameters.is_tiprack);
        assert_eq!(def.tip_volume(), Some(300.0));
        assert!(def.well("H12").is_some());
        assert!(def.well("I1").is_none());
    }

    #[test]
    fn test_unknown_version_or_name() {
        assert!(standard_definition("nest_12_reservoir_15ml", 2).is_none());
        assert!(standard_definition("mystery_plate", 1).is_none());
        assert!(standard_definition("opentrons_24_aluminumblock_generic_2ml_screwcap", 2).is_some());
    }

    #[test]
    fn test_load_dir_reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut def = standard_definition("corning_96_wellplate_360ul_flat", 1).unwrap();
        def.namespace = "custom_beta".to_string();
        std::fs::write(
            dir.path().join("plate.json"),
            serde_json::to_string(&def).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = LabwareDefinition::load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].uri(), "custom_beta/corning_96_wellplate_360ul_flat/1");
    }
}
