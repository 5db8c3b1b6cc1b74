// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Module state: loaded modules, their targets and last polled reading.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InvariantViolation;
use crate::state::{ModuleTarget, StateChange};
use crate::types::{ModuleModel, ModuleReading, ModuleType};

/// Fuzzy comparison for hold times read back from a module.
///
/// The remaining hold time counts down between the set call and the
/// read-back, so a reading up to one polling window below the requested
/// time still means the hold was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldTimeTolerance {
    polling_window: Duration,
}

impl HoldTimeTolerance {
    pub fn new(polling_window: Duration) -> Self {
        Self { polling_window }
    }

    pub fn polling_window(&self) -> Duration {
        self.polling_window
    }

    /// True iff `new_hold_time - window <= observed <= new_hold_time` (seconds).
    pub fn probably_set(&self, new_hold_time: f64, observed_remaining: f64) -> bool {
        let lower = new_hold_time - self.polling_window.as_secs_f64();
        lower <= observed_remaining && observed_remaining <= new_hold_time
    }
}

/// Targets last commanded on a module.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTargets {
    pub temperature: Option<f64>,
    pub hold_time_seconds: Option<f64>,
    pub shake_speed: Option<f64>,
    pub magnet_height: Option<f64>,
}

/// A loaded module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedModule {
    pub id: String,
    pub serial_number: String,
    pub model: ModuleModel,
    pub slot_name: String,
    pub targets: ModuleTargets,
    /// Last reading from the module's poller.
    pub reading: Option<ModuleReading>,
}

impl LoadedModule {
    pub fn module_type(&self) -> ModuleType {
        self.model.module_type()
    }
}

/// Module slice of the run state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleState {
    modules: BTreeMap<String, LoadedModule>,
}

impl ModuleState {
    pub(crate) fn apply(&mut self, change: &StateChange) {
        match change {
            StateChange::LoadedModule {
                module_id,
                serial,
                model,
                slot_name,
            } => {
                self.modules.insert(
                    module_id.clone(),
                    LoadedModule {
                        id: module_id.clone(),
                        serial_number: serial.clone(),
                        model: *model,
                        slot_name: slot_name.clone(),
                        targets: ModuleTargets::default(),
                        reading: None,
                    },
                );
            }
            StateChange::ModuleTarget { module_id, target } => {
                if let Some(module) = self.modules.get_mut(module_id) {
                    let targets = &mut module.targets;
                    match *target {
                        ModuleTarget::Temperature {
                            celsius,
                            hold_time_seconds,
                        } => {
                            targets.temperature = Some(celsius);
                            targets.hold_time_seconds = hold_time_seconds;
                        }
                        ModuleTarget::ShakeSpeed { rpm } => targets.shake_speed = Some(rpm),
                        ModuleTarget::MagnetHeight { height } => {
                            targets.magnet_height = Some(height)
                        }
                        ModuleTarget::Deactivated => *targets = ModuleTargets::default(),
                    }
                }
            }
            _ => {}
        }
    }

    /// Absorb a polled reading. Readings for unloaded serials are dropped.
    pub(crate) fn update_reading(&mut self, serial: &str, reading: &ModuleReading) {
        if let Some(module) = self
            .modules
            .values_mut()
            .find(|m| m.serial_number == serial)
        {
            module.reading = Some(reading.clone());
        }
    }

    pub fn get(&self, module_id: &str) -> Result<&LoadedModule, InvariantViolation> {
        self.modules
            .get(module_id)
            .ok_or_else(|| InvariantViolation::ModuleNotLoaded {
                module_id: module_id.to_string(),
            })
    }

    /// Get a module and check its family.
    pub fn get_of_type(
        &self,
        module_id: &str,
        expected: ModuleType,
    ) -> Result<&LoadedModule, InvariantViolation> {
        let module = self.get(module_id)?;
        if module.module_type() != expected {
            return Err(InvariantViolation::WrongModuleType {
                module_id: module_id.to_string(),
                expected: format!("{:?}", expected),
            });
        }
        Ok(module)
    }

    pub fn get_all(&self) -> impl Iterator<Item = &LoadedModule> {
        self.modules.values()
    }

    pub fn get_by_serial(&self, serial: &str) -> Option<&LoadedModule> {
        self.modules.values().find(|m| m.serial_number == serial)
    }

    pub fn get_in_slot(&self, slot_name: &str) -> Option<&LoadedModule> {
        self.modules.values().find(|m| m.slot_name == slot_name)
    }
}
