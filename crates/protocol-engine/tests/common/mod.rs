// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for protocol engine integration tests.
//!
//! Provides TestContext: an engine wired to simulated hardware, plus a
//! standard OT-2 deck.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};

use opentrons_hardware::{RobotGeneration, SimulatedHardware};
use protocol_engine::{Command, EngineConfig, Liquid, ProtocolEngine, ProtocolEngineBuilder};

pub const TIPRACK: &str = "tips";
pub const PLATE: &str = "plate";
pub const RESERVOIR: &str = "reservoir";
pub const PIPETTE: &str = "p300";
pub const WATER: &str = "water";

/// Engine plus the simulator behind it.
pub struct TestContext {
    pub hardware: Arc<SimulatedHardware>,
    pub engine: ProtocolEngine,
}

impl TestContext {
    /// OT-2 engine with default config.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_builder(config, |builder| builder)
    }

    /// Customise the builder before spawning.
    pub fn with_builder(
        config: EngineConfig,
        customise: impl FnOnce(ProtocolEngineBuilder) -> ProtocolEngineBuilder,
    ) -> Self {
        let hardware = Arc::new(SimulatedHardware::new(config.robot_generation));
        let builder = ProtocolEngine::builder(config, hardware.clone()).event_source(hardware.clone());
        let engine = customise(builder).spawn();
        Self { hardware, engine }
    }

    /// Flex engine.
    pub fn flex() -> Self {
        Self::with_config(EngineConfig {
            robot_generation: RobotGeneration::Flex,
            ..EngineConfig::default()
        })
    }

    /// Queue a command from its JSON wire form.
    pub async fn add(&self, request: Value) -> Command {
        self.engine
            .add_command_json(request)
            .await
            .expect("Failed to queue command")
    }

    /// Queue a command ahead of the protocol.
    pub async fn insert_now(&self, request: Value) -> Command {
        let request = serde_json::from_value(request).expect("Invalid command request");
        self.engine
            .insert_now(request)
            .await
            .expect("Failed to insert command")
    }

    /// Tip rack in slot 1, plate in slot 2, reservoir in slot 3 with 10 µL
    /// of water in A1, and a P300 on the left mount.
    pub async fn load_standard_deck(&self) {
        self.load_standard_deck_with(false).await;
    }

    pub async fn load_standard_deck_with(&self, liquid_presence_detection: bool) {
        self.engine
            .add_liquid(Liquid {
                id: WATER.to_string(),
                display_name: "Water".to_string(),
                description: String::new(),
            })
            .await
            .expect("Failed to add liquid");

        self.add(load_labware(TIPRACK, "opentrons_96_tiprack_300ul", "1")).await;
        self.add(load_labware(PLATE, "corning_96_wellplate_360ul_flat", "2")).await;
        self.add(load_labware(RESERVOIR, "nest_12_reservoir_15ml", "3")).await;
        self.add(json!({
            "commandType": "loadPipette",
            "params": {
                "pipetteName": "p300_single_gen2",
                "mount": "left",
                "pipetteId": PIPETTE,
                "liquidPresenceDetection": liquid_presence_detection,
            }
        }))
        .await;
        self.add(json!({
            "commandType": "loadLiquid",
            "params": {
                "liquidId": WATER,
                "labwareId": RESERVOIR,
                "volumeByWell": {"A1": 10.0},
            }
        }))
        .await;
    }
}

pub fn load_labware(labware_id: &str, load_name: &str, slot: &str) -> Value {
    json!({
        "commandType": "loadLabware",
        "params": {
            "location": {"kind": "slot", "slotName": slot},
            "loadName": load_name,
            "labwareId": labware_id,
        }
    })
}

pub fn pick_up_tip(well_name: &str) -> Value {
    json!({
        "commandType": "pickUpTip",
        "params": {"pipetteId": PIPETTE, "labwareId": TIPRACK, "wellName": well_name}
    })
}

pub fn drop_tip() -> Value {
    json!({"commandType": "dropTip", "params": {"pipetteId": PIPETTE}})
}

pub fn aspirate(labware_id: &str, well_name: &str, volume: f64) -> Value {
    json!({
        "commandType": "aspirate",
        "params": {
            "pipetteId": PIPETTE,
            "labwareId": labware_id,
            "wellName": well_name,
            "volume": volume,
        }
    })
}

pub fn dispense(labware_id: &str, well_name: &str, volume: f64) -> Value {
    json!({
        "commandType": "dispense",
        "params": {
            "pipetteId": PIPETTE,
            "labwareId": labware_id,
            "wellName": well_name,
            "volume": volume,
        }
    })
}

pub fn home() -> Value {
    json!({"commandType": "home", "params": {}})
}
