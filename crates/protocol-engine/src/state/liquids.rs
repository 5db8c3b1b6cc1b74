// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Liquid definitions and per-well volume tracking.
//!
//! Only wells filled by `loadLiquid` are tracked. Untracked wells have no
//! known volume and are never checked for over-aspiration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::actions::Liquid;
use crate::error::InvariantViolation;
use crate::state::StateChange;

const VOLUME_EPSILON: f64 = 1e-9;

/// Reject volumes that are NaN, infinite or negative.
pub fn validate_volume(volume: f64) -> Result<(), InvariantViolation> {
    if !volume.is_finite() {
        return Err(InvariantViolation::NonFiniteVolume { volume });
    }
    if volume < 0.0 {
        return Err(InvariantViolation::NegativeVolume { volume });
    }
    Ok(())
}

/// Tracked contents of one well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellLiquid {
    pub liquid_id: String,
    pub volume: f64,
}

/// Liquid slice of the run state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiquidState {
    liquids: BTreeMap<String, Liquid>,
    /// labware id -> well name -> contents
    wells: BTreeMap<String, BTreeMap<String, WellLiquid>>,
}

impl LiquidState {
    pub(crate) fn add_liquid(&mut self, liquid: &Liquid) {
        self.liquids.insert(liquid.id.clone(), liquid.clone());
    }

    pub(crate) fn apply(&mut self, change: &StateChange) {
        match change {
            StateChange::LiquidLoaded {
                liquid_id,
                labware_id,
                volume_by_well,
            } => {
                let wells = self.wells.entry(labware_id.clone()).or_default();
                for (well_name, volume) in volume_by_well {
                    wells.insert(
                        well_name.clone(),
                        WellLiquid {
                            liquid_id: liquid_id.clone(),
                            volume: *volume,
                        },
                    );
                }
            }
            StateChange::WellVolume {
                labware_id,
                well_name,
                delta,
            } => {
                if let Some(well) = self
                    .wells
                    .get_mut(labware_id)
                    .and_then(|wells| wells.get_mut(well_name))
                {
                    well.volume += delta;
                }
            }
            _ => {}
        }
    }

    pub fn get_liquid(&self, liquid_id: &str) -> Result<&Liquid, InvariantViolation> {
        self.liquids
            .get(liquid_id)
            .ok_or_else(|| InvariantViolation::LiquidNotDefined {
                liquid_id: liquid_id.to_string(),
            })
    }

    pub fn get_all(&self) -> impl Iterator<Item = &Liquid> {
        self.liquids.values()
    }

    pub fn get_well_liquid(&self, labware_id: &str, well_name: &str) -> Option<&WellLiquid> {
        self.wells.get(labware_id)?.get(well_name)
    }

    /// Tracked volume, or `None` for untracked wells.
    pub fn get_well_volume(&self, labware_id: &str, well_name: &str) -> Option<f64> {
        self.get_well_liquid(labware_id, well_name)
            .map(|well| well.volume)
    }

    /// Whether liquid is expected in the well. `None` when untracked.
    pub fn get_expects_liquid(&self, labware_id: &str, well_name: &str) -> Option<bool> {
        self.get_well_volume(labware_id, well_name)
            .map(|volume| volume > VOLUME_EPSILON)
    }

    /// Reject aspirating more than a tracked well holds.
    pub fn validate_aspirate_from_well(
        &self,
        labware_id: &str,
        well_name: &str,
        volume: f64,
    ) -> Result<(), InvariantViolation> {
        validate_volume(volume)?;
        match self.get_well_volume(labware_id, well_name) {
            Some(available) if volume > available + VOLUME_EPSILON => {
                Err(InvariantViolation::OverAspiration {
                    labware_id: labware_id.to_string(),
                    well_name: well_name.to_string(),
                    requested: volume,
                    available,
                })
            }
            _ => Ok(()),
        }
    }

    /// Reject dispensing past a tracked well's capacity.
    pub fn validate_dispense_into_well(
        &self,
        labware_id: &str,
        well_name: &str,
        volume: f64,
        capacity: f64,
    ) -> Result<(), InvariantViolation> {
        validate_volume(volume)?;
        match self.get_well_volume(labware_id, well_name) {
            Some(current) if current + volume > capacity + VOLUME_EPSILON => {
                Err(InvariantViolation::WellCapacityExceeded {
                    labware_id: labware_id.to_string(),
                    well_name: well_name.to_string(),
                    volume: current + volume,
                    capacity,
                })
            }
            _ => Ok(()),
        }
    }
}
