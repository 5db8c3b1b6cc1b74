// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipette state: tips, aspirated volume and nozzle layout.
//!
//! Aspirated volume is `None` when it cannot be trusted: no tip is attached,
//! or a plunger fault left the contents unknown. The validators are the only
//! gate that keeps `0 <= volume <= working volume`; the reducer applies
//! whatever a handler reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InvariantViolation;
use crate::state::{FluidChange, StateChange, validate_volume};
use crate::types::{Mount, NozzleLayout, PipetteName, PipetteSpec};

const VOLUME_EPSILON: f64 = 1e-9;

/// Tip on a pipette.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedTip {
    pub volume: f64,
    pub length: f64,
}

/// A loaded pipette and its live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedPipette {
    pub id: String,
    pub pipette_name: PipetteName,
    pub mount: Mount,
    pub liquid_presence_detection: bool,
    pub tip: Option<AttachedTip>,
    pub aspirated_volume: Option<f64>,
    pub nozzle_layout: NozzleLayout,
}

impl LoadedPipette {
    pub fn spec(&self) -> PipetteSpec {
        self.pipette_name.spec()
    }
}

/// Last well a pipette moved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWell {
    pub pipette_id: String,
    pub labware_id: String,
    pub well_name: String,
}

/// Pipette slice of the run state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipetteState {
    pipettes: BTreeMap<String, LoadedPipette>,
    current_well: Option<CurrentWell>,
}

impl PipetteState {
    pub(crate) fn apply(&mut self, change: &StateChange) {
        match change {
            StateChange::LoadedPipette {
                pipette_id,
                pipette_name,
                mount,
                liquid_presence_detection,
            } => {
                self.pipettes.insert(
                    pipette_id.clone(),
                    LoadedPipette {
                        id: pipette_id.clone(),
                        pipette_name: *pipette_name,
                        mount: *mount,
                        liquid_presence_detection: *liquid_presence_detection,
                        tip: None,
                        aspirated_volume: None,
                        nozzle_layout: NozzleLayout::All,
                    },
                );
            }
            StateChange::PipetteTip { pipette_id, tip } => {
                if let Some(pipette) = self.pipettes.get_mut(pipette_id) {
                    pipette.tip = tip.map(|(volume, length)| AttachedTip { volume, length });
                    pipette.aspirated_volume = tip.map(|_| 0.0);
                }
            }
            StateChange::PipetteFluid { pipette_id, change } => {
                if let Some(pipette) = self.pipettes.get_mut(pipette_id) {
                    pipette.aspirated_volume = match (change, pipette.aspirated_volume) {
                        (FluidChange::Aspirated(v), current) => Some(current.unwrap_or(0.0) + v),
                        (FluidChange::Dispensed(v), Some(current)) => Some((current - v).max(0.0)),
                        (FluidChange::Dispensed(_), None) => None,
                        (FluidChange::Empty, _) => Some(0.0),
                        (FluidChange::Unknown, _) => None,
                    };
                }
            }
            StateChange::PipetteLocation {
                pipette_id,
                labware_id,
                well_name,
            } => {
                self.current_well = Some(CurrentWell {
                    pipette_id: pipette_id.clone(),
                    labware_id: labware_id.clone(),
                    well_name: well_name.clone(),
                });
            }
            StateChange::NozzleLayout { pipette_id, layout } => {
                if let Some(pipette) = self.pipettes.get_mut(pipette_id) {
                    pipette.nozzle_layout = layout.clone();
                }
            }
            StateChange::LabwareLocation { labware_id, .. } => {
                // Moving labware invalidates the cached position above it.
                if self
                    .current_well
                    .as_ref()
                    .is_some_and(|w| &w.labware_id == labware_id)
                {
                    self.current_well = None;
                }
            }
            _ => {}
        }
    }

    pub fn get(&self, pipette_id: &str) -> Result<&LoadedPipette, InvariantViolation> {
        self.pipettes
            .get(pipette_id)
            .ok_or_else(|| InvariantViolation::PipetteNotLoaded {
                pipette_id: pipette_id.to_string(),
            })
    }

    pub fn get_all(&self) -> impl Iterator<Item = &LoadedPipette> {
        self.pipettes.values()
    }

    pub fn get_by_mount(&self, mount: Mount) -> Option<&LoadedPipette> {
        self.pipettes.values().find(|p| p.mount == mount)
    }

    pub fn get_current_well(&self) -> Option<&CurrentWell> {
        self.current_well.as_ref()
    }

    pub fn get_attached_tip(&self, pipette_id: &str) -> Result<Option<AttachedTip>, InvariantViolation> {
        Ok(self.get(pipette_id)?.tip)
    }

    pub fn get_aspirated_volume(&self, pipette_id: &str) -> Result<Option<f64>, InvariantViolation> {
        Ok(self.get(pipette_id)?.aspirated_volume)
    }

    /// Usable volume: the smaller of tip capacity and plunger capacity.
    pub fn get_working_volume(&self, pipette_id: &str) -> Result<f64, InvariantViolation> {
        let pipette = self.get(pipette_id)?;
        let tip = pipette.tip.ok_or_else(|| InvariantViolation::NoTipAttached {
            pipette_id: pipette_id.to_string(),
        })?;
        Ok(tip.volume.min(pipette.spec().max_volume))
    }

    /// Volume that can still be aspirated.
    pub fn get_available_volume(&self, pipette_id: &str) -> Result<f64, InvariantViolation> {
        let working_volume = self.get_working_volume(pipette_id)?;
        let aspirated = self
            .get_aspirated_volume(pipette_id)?
            .ok_or_else(|| InvariantViolation::AspiratedVolumeUnknown {
                pipette_id: pipette_id.to_string(),
            })?;
        Ok((working_volume - aspirated).max(0.0))
    }

    pub fn validate_tip_absent(&self, pipette_id: &str) -> Result<(), InvariantViolation> {
        if self.get(pipette_id)?.tip.is_some() {
            return Err(InvariantViolation::TipAlreadyAttached {
                pipette_id: pipette_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_tip_present(&self, pipette_id: &str) -> Result<AttachedTip, InvariantViolation> {
        self.get(pipette_id)?
            .tip
            .ok_or_else(|| InvariantViolation::NoTipAttached {
                pipette_id: pipette_id.to_string(),
            })
    }

    /// Check an aspirate keeps the volume within the working volume.
    pub fn validate_aspirate(&self, pipette_id: &str, volume: f64) -> Result<(), InvariantViolation> {
        validate_volume(volume)?;
        self.validate_tip_present(pipette_id)?;
        let available = self.get_available_volume(pipette_id)?;
        if volume > available + VOLUME_EPSILON {
            return Err(InvariantViolation::PipetteVolumeExceeded {
                pipette_id: pipette_id.to_string(),
                requested: volume,
                available,
                working_volume: self.get_working_volume(pipette_id)?,
            });
        }
        Ok(())
    }

    /// Check a dispense does not push out more than is held.
    pub fn validate_dispense(&self, pipette_id: &str, volume: f64) -> Result<(), InvariantViolation> {
        validate_volume(volume)?;
        self.validate_tip_present(pipette_id)?;
        let aspirated = self
            .get_aspirated_volume(pipette_id)?
            .ok_or_else(|| InvariantViolation::AspiratedVolumeUnknown {
                pipette_id: pipette_id.to_string(),
            })?;
        if volume > aspirated + VOLUME_EPSILON {
            return Err(InvariantViolation::DispenseExceedsAspirated {
                pipette_id: pipette_id.to_string(),
                requested: volume,
                aspirated,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_p300() -> PipetteState {
        let mut state = PipetteState::default();
        state.apply(&StateChange::LoadedPipette {
            pipette_id: "p".into(),
            pipette_name: PipetteName::P300SingleGen2,
            mount: Mount::Left,
            liquid_presence_detection: false,
        });
        state
    }

    fn fluid(state: &mut PipetteState, change: FluidChange) {
        state.apply(&StateChange::PipetteFluid {
            pipette_id: "p".into(),
            change,
        });
    }

    #[test]
    fn test_no_tip_rejects_liquid_handling() {
        let state = with_p300();
        assert!(matches!(
            state.validate_aspirate("p", 10.0),
            Err(InvariantViolation::NoTipAttached { .. })
        ));
        assert!(matches!(
            state.validate_dispense("p", 10.0),
            Err(InvariantViolation::NoTipAttached { .. })
        ));
    }

    #[test]
    fn test_non_finite_volumes_are_rejected() {
        let mut state = with_p300();
        state.apply(&StateChange::PipetteTip {
            pipette_id: "p".into(),
            tip: Some((300.0, 59.3)),
        });
        fluid(&mut state, FluidChange::Aspirated(50.0));

        for volume in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                state.validate_aspirate("p", volume),
                Err(InvariantViolation::NonFiniteVolume { .. })
            ));
            assert!(matches!(
                state.validate_dispense("p", volume),
                Err(InvariantViolation::NonFiniteVolume { .. })
            ));
        }
        assert_eq!(state.get_aspirated_volume("p").unwrap(), Some(50.0));
    }

    #[test]
    fn test_working_volume_limited_by_tip() {
        let mut state = with_p300();
        state.apply(&StateChange::PipetteTip {
            pipette_id: "p".into(),
            tip: Some((20.0, 39.2)),
        });
        assert_eq!(state.get_working_volume("p").unwrap(), 20.0);
        assert!(state.validate_aspirate("p", 20.0).is_ok());
        assert!(matches!(
            state.validate_aspirate("p", 20.5),
            Err(InvariantViolation::PipetteVolumeExceeded { .. })
        ));
    }

    #[test]
    fn test_volume_stays_within_bounds_across_sequence() {
        let mut state = with_p300();
        state.apply(&StateChange::PipetteTip {
            pipette_id: "p".into(),
            tip: Some((300.0, 59.3)),
        });

        let steps: [(bool, f64); 6] = [
            (true, 100.0),
            (true, 150.0),
            (true, 60.0),
            (false, 200.0),
            (false, 60.0),
            (false, 50.0),
        ];
        for (is_aspirate, volume) in steps {
            let check = if is_aspirate {
                state.validate_aspirate("p", volume)
            } else {
                state.validate_dispense("p", volume)
            };
            if check.is_ok() {
                let change = if is_aspirate {
                    FluidChange::Aspirated(volume)
                } else {
                    FluidChange::Dispensed(volume)
                };
                fluid(&mut state, change);
            }
            let current = state.get_aspirated_volume("p").unwrap().unwrap();
            assert!((0.0..=300.0).contains(&current), "volume {current} out of range");
        }
        // 100 + 150 in, 60 rejected, 200 out, 60 rejected (only 50 left), 50 out.
        assert_eq!(state.get_aspirated_volume("p").unwrap(), Some(0.0));
    }

    #[test]
    fn test_unknown_volume_after_fault() {
        let mut state = with_p300();
        state.apply(&StateChange::PipetteTip {
            pipette_id: "p".into(),
            tip: Some((300.0, 59.3)),
        });
        fluid(&mut state, FluidChange::Aspirated(50.0));
        fluid(&mut state, FluidChange::Unknown);
        assert!(matches!(
            state.validate_aspirate("p", 1.0),
            Err(InvariantViolation::AspiratedVolumeUnknown { .. })
        ));

        fluid(&mut state, FluidChange::Empty);
        assert!(state.validate_aspirate("p", 1.0).is_ok());
    }

    #[test]
    fn test_drop_tip_clears_volume() {
        let mut state = with_p300();
        state.apply(&StateChange::PipetteTip {
            pipette_id: "p".into(),
            tip: Some((300.0, 59.3)),
        });
        fluid(&mut state, FluidChange::Aspirated(50.0));
        state.apply(&StateChange::PipetteTip {
            pipette_id: "p".into(),
            tip: None,
        });
        assert_eq!(state.get_aspirated_volume("p").unwrap(), None);
        assert!(state.validate_tip_absent("p").is_ok());
    }
}
