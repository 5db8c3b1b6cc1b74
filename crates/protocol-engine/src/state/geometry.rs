// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deck geometry derived from labware and module state.
//!
//! Positions are in deck coordinates (mm), origin at the front-left corner
//! of the front-left slot. Labware relationships are walked through ids, so
//! a stack is resolved by repeated lookups rather than object pointers.

use crate::error::InvariantViolation;
use crate::state::labware::LabwareState;
use crate::state::modules::ModuleState;
use crate::types::{LabwareLocation, Point, RobotGeneration, WellLocation, WellOrigin};

/// Footprint of a deck slot.
pub const SLOT_SIZE_X: f64 = 127.76;
pub const SLOT_SIZE_Y: f64 = 85.48;

const OT2_PITCH_X: f64 = 132.5;
const OT2_PITCH_Y: f64 = 90.5;
const FLEX_PITCH_X: f64 = 164.0;
const FLEX_PITCH_Y: f64 = 107.0;

/// Read-only geometry queries over a state snapshot.
#[derive(Debug, Clone, Copy)]
pub struct GeometryView<'a> {
    labware: &'a LabwareState,
    modules: &'a ModuleState,
    generation: RobotGeneration,
}

impl<'a> GeometryView<'a> {
    pub(crate) fn new(
        labware: &'a LabwareState,
        modules: &'a ModuleState,
        generation: RobotGeneration,
    ) -> Self {
        Self {
            labware,
            modules,
            generation,
        }
    }

    /// Whether `slot_name` exists on this robot.
    pub fn has_slot(&self, slot_name: &str) -> bool {
        self.generation.deck_slots().contains(&slot_name)
    }

    /// Front-left-bottom corner of a slot.
    pub fn get_slot_position(&self, slot_name: &str) -> Result<Point, InvariantViolation> {
        let not_found = || InvariantViolation::SlotNotFound {
            slot_name: slot_name.to_string(),
        };
        if !self.has_slot(slot_name) {
            return Err(not_found());
        }
        let (column, row, pitch_x, pitch_y) = match self.generation {
            RobotGeneration::Ot2 => {
                let n: usize = slot_name.parse().map_err(|_| not_found())?;
                ((n - 1) % 3, (n - 1) / 3, OT2_PITCH_X, OT2_PITCH_Y)
            }
            RobotGeneration::Flex => {
                let mut chars = slot_name.chars();
                let row = match chars.next() {
                    Some('D') => 0,
                    Some('C') => 1,
                    Some('B') => 2,
                    Some('A') => 3,
                    _ => return Err(not_found()),
                };
                let column = chars
                    .next()
                    .and_then(|c| c.to_digit(10))
                    .ok_or_else(not_found)? as usize;
                (column - 1, row, FLEX_PITCH_X, FLEX_PITCH_Y)
            }
        };
        Ok(Point::new(
            column as f64 * pitch_x,
            row as f64 * pitch_y,
            0.0,
        ))
    }

    pub fn get_slot_center_position(&self, slot_name: &str) -> Result<Point, InvariantViolation> {
        let origin = self.get_slot_position(slot_name)?;
        Ok(origin.offset(Point::new(SLOT_SIZE_X / 2.0, SLOT_SIZE_Y / 2.0, 0.0)))
    }

    /// Deck slot a location ultimately rests in.
    pub fn get_location_slot(&self, location: &LabwareLocation) -> Result<String, InvariantViolation> {
        let mut location = location.clone();
        for _ in 0..=self.labware.get_all().count() {
            match location {
                LabwareLocation::Slot { slot_name } => return Ok(slot_name),
                LabwareLocation::Module { module_id } => {
                    return Ok(self.modules.get(&module_id)?.slot_name.clone());
                }
                LabwareLocation::OnLabware { labware_id } => {
                    location = self.labware.get_location(&labware_id)?.clone();
                }
                LabwareLocation::OffDeck => break,
            }
        }
        Err(InvariantViolation::SlotNotFound {
            slot_name: "offDeck".to_string(),
        })
    }

    /// Front-left-bottom corner of a labware.
    pub fn get_labware_origin(&self, labware_id: &str) -> Result<Point, InvariantViolation> {
        let mut lift = 0.0;
        let mut current = labware_id.to_string();
        for _ in 0..=self.labware.get_all().count() {
            match self.labware.get_location(&current)? {
                LabwareLocation::Slot { slot_name } => {
                    return Ok(self
                        .get_slot_position(slot_name)?
                        .offset(Point::new(0.0, 0.0, lift)));
                }
                LabwareLocation::Module { module_id } => {
                    let module = self.modules.get(module_id)?;
                    let seat = module.model.labware_offset_z();
                    return Ok(self
                        .get_slot_position(&module.slot_name)?
                        .offset(Point::new(0.0, 0.0, lift + seat)));
                }
                LabwareLocation::OnLabware { labware_id: parent } => {
                    lift += self.labware.get_definition(parent)?.dimensions.z_dimension;
                    current = parent.clone();
                }
                LabwareLocation::OffDeck => break,
            }
        }
        Err(InvariantViolation::LabwareOffDeck {
            labware_id: labware_id.to_string(),
        })
    }

    /// Absolute position of a point in a well.
    pub fn get_well_position(
        &self,
        labware_id: &str,
        well_name: &str,
        location: &WellLocation,
    ) -> Result<Point, InvariantViolation> {
        let origin = self.get_labware_origin(labware_id)?;
        let well = self.labware.get_well(labware_id, well_name)?;
        let z = match location.origin {
            WellOrigin::Bottom => well.z,
            WellOrigin::Center => well.z + well.depth / 2.0,
            WellOrigin::Top => well.z + well.depth,
        };
        Ok(origin
            .offset(Point::new(well.x, well.y, z))
            .offset(location.offset))
    }

    /// Top center of a well.
    pub fn get_well_top(&self, labware_id: &str, well_name: &str) -> Result<Point, InvariantViolation> {
        self.get_well_position(labware_id, well_name, &WellLocation::default())
    }

    /// Highest point of a labware, including anything it sits on.
    pub fn get_labware_highest_z(&self, labware_id: &str) -> Result<f64, InvariantViolation> {
        let origin = self.get_labware_origin(labware_id)?;
        let definition = self.labware.get_definition(labware_id)?;
        Ok(origin.z + definition.dimensions.z_dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::standard_definition;
    use crate::state::StateChange;
    use crate::types::ModuleModel;

    fn load(labware: &mut LabwareState, id: &str, load_name: &str, location: LabwareLocation) {
        labware.apply(&StateChange::LoadedLabware {
            labware_id: id.into(),
            definition: Box::new(standard_definition(load_name, 1).unwrap()),
            location,
            display_name: None,
        });
    }

    #[test]
    fn test_slot_positions_per_generation() {
        let labware = LabwareState::default();
        let modules = ModuleState::default();
        let ot2 = GeometryView::new(&labware, &modules, RobotGeneration::Ot2);
        assert_eq!(ot2.get_slot_position("1").unwrap(), Point::new(0.0, 0.0, 0.0));
        assert_eq!(
            ot2.get_slot_position("5").unwrap(),
            Point::new(132.5, 90.5, 0.0)
        );
        assert_eq!(
            ot2.get_slot_center_position("1").unwrap(),
            Point::new(63.88, 42.74, 0.0)
        );
        assert!(ot2.get_slot_position("D1").is_err());

        let flex = GeometryView::new(&labware, &modules, RobotGeneration::Flex);
        assert_eq!(
            flex.get_slot_position("A3").unwrap(),
            Point::new(328.0, 321.0, 0.0)
        );
        assert!(flex.get_slot_position("5").is_err());
    }

    #[test]
    fn test_labware_on_module_is_lifted() {
        let mut labware = LabwareState::default();
        let mut modules = ModuleState::default();
        modules.apply(&StateChange::LoadedModule {
            module_id: "temp".into(),
            serial: "TM-1".into(),
            model: ModuleModel::TemperatureModuleV2,
            slot_name: "3".into(),
        });
        load(
            &mut labware,
            "plate",
            "corning_96_wellplate_360ul_flat",
            LabwareLocation::Module {
                module_id: "temp".into(),
            },
        );
        let geometry = GeometryView::new(&labware, &modules, RobotGeneration::Ot2);
        let origin = geometry.get_labware_origin("plate").unwrap();
        assert_eq!(origin, Point::new(265.0, 0.0, 9.0));
        assert_eq!(
            geometry
                .get_location_slot(&LabwareLocation::OnLabware {
                    labware_id: "plate".into()
                })
                .unwrap(),
            "3"
        );
    }

    #[test]
    fn test_well_origins() {
        let mut labware = LabwareState::default();
        let modules = ModuleState::default();
        load(
            &mut labware,
            "plate",
            "corning_96_wellplate_360ul_flat",
            LabwareLocation::slot("1"),
        );
        let geometry = GeometryView::new(&labware, &modules, RobotGeneration::Ot2);
        let well = labware.get_well("plate", "A1").unwrap();

        let bottom = geometry
            .get_well_position("plate", "A1", &WellLocation::at(WellOrigin::Bottom, 1.0))
            .unwrap();
        assert!((bottom.z - (well.z + 1.0)).abs() < 1e-9);

        let top = geometry.get_well_top("plate", "A1").unwrap();
        assert!((top.z - (well.z + well.depth)).abs() < 1e-9);
        assert!((top.x - well.x).abs() < 1e-9);
    }

    #[test]
    fn test_off_deck_has_no_position() {
        let mut labware = LabwareState::default();
        let modules = ModuleState::default();
        load(
            &mut labware,
            "plate",
            "corning_96_wellplate_360ul_flat",
            LabwareLocation::OffDeck,
        );
        let geometry = GeometryView::new(&labware, &modules, RobotGeneration::Ot2);
        assert!(matches!(
            geometry.get_labware_origin("plate"),
            Err(InvariantViolation::LabwareOffDeck { .. })
        ));
    }
}
