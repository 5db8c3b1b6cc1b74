// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Labware state: loaded labware, their definitions and custom definitions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::definitions::{
    LabwareDefinition, STANDARD_NAMESPACE, WellDefinition, definition_uri, standard_definition,
};
use crate::error::{EngineError, InvariantViolation};
use crate::state::StateChange;
use crate::types::LabwareLocation;

/// Standard labware whose version 1 geometry is wrong; they default to 2.
const VERSION_2_DEFAULTS: [&str; 2] = [
    "opentrons_24_aluminumblock_generic_2ml_screwcap",
    "opentrons_96_aluminumblock_generic_pcr_strip_200ul",
];

/// A labware instance on (or off) the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedLabware {
    pub id: String,
    pub load_name: String,
    pub definition_uri: String,
    pub location: LabwareLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Resolve the `(namespace, version)` to load for `load_name`.
///
/// `custom_definitions` are searched only when the request leaves the
/// namespace or version open. Deterministic for identical inputs.
pub fn resolve_load_params<'a>(
    load_name: &str,
    namespace: Option<&str>,
    version: Option<u32>,
    custom_definitions: impl IntoIterator<Item = &'a LabwareDefinition>,
) -> Result<(String, u32), EngineError> {
    if let (Some(namespace), Some(version)) = (namespace, version) {
        return Ok((namespace.to_string(), version));
    }

    let candidates: Vec<&LabwareDefinition> = custom_definitions
        .into_iter()
        .filter(|def| def.load_name() == load_name)
        .filter(|def| namespace.is_none_or(|ns| def.namespace == ns))
        .filter(|def| version.is_none_or(|v| def.version == v))
        .collect();

    match candidates.as_slice() {
        [] => {
            let default_version = if VERSION_2_DEFAULTS.contains(&load_name) {
                2
            } else {
                1
            };
            Ok((
                namespace.unwrap_or(STANDARD_NAMESPACE).to_string(),
                version.unwrap_or(default_version),
            ))
        }
        [only] => Ok((only.namespace.clone(), only.version)),
        many => {
            let mut uris: Vec<String> = many.iter().map(|def| def.uri()).collect();
            uris.sort();
            Err(EngineError::AmbiguousLoadLabwareParams {
                load_name: load_name.to_string(),
                candidates: uris.join(", "),
            })
        }
    }
}

/// Labware slice of the run state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabwareState {
    labware: BTreeMap<String, LoadedLabware>,
    /// Definitions of loaded labware, by URI.
    definitions: BTreeMap<String, LabwareDefinition>,
    /// Definitions added by the client, by URI.
    custom_definitions: BTreeMap<String, LabwareDefinition>,
    used_tips: BTreeMap<String, BTreeSet<String>>,
}

impl LabwareState {
    pub(crate) fn add_definition(&mut self, definition: &LabwareDefinition) {
        self.custom_definitions
            .insert(definition.uri(), definition.clone());
    }

    pub(crate) fn apply(&mut self, change: &StateChange) {
        match change {
            StateChange::LoadedLabware {
                labware_id,
                definition,
                location,
                display_name,
            } => {
                let uri = definition.uri();
                self.labware.insert(
                    labware_id.clone(),
                    LoadedLabware {
                        id: labware_id.clone(),
                        load_name: definition.load_name().to_string(),
                        definition_uri: uri.clone(),
                        location: location.clone(),
                        display_name: display_name.clone(),
                    },
                );
                self.definitions.insert(uri, (**definition).clone());
            }
            StateChange::LabwareLocation {
                labware_id,
                new_location,
            } => {
                if let Some(labware) = self.labware.get_mut(labware_id) {
                    labware.location = new_location.clone();
                }
            }
            StateChange::TipsUsed {
                labware_id,
                well_names,
            } => {
                self.used_tips
                    .entry(labware_id.clone())
                    .or_default()
                    .extend(well_names.iter().cloned());
            }
            _ => {}
        }
    }

    /// Resolve load params against the custom definitions added so far.
    pub fn resolve_load_params(
        &self,
        load_name: &str,
        namespace: Option<&str>,
        version: Option<u32>,
    ) -> Result<(String, u32), EngineError> {
        resolve_load_params(
            load_name,
            namespace,
            version,
            self.custom_definitions.values(),
        )
    }

    /// Find a definition, custom first, then the standard set.
    pub fn find_definition(
        &self,
        namespace: &str,
        load_name: &str,
        version: u32,
    ) -> Result<LabwareDefinition, EngineError> {
        let uri = definition_uri(namespace, load_name, version);
        if let Some(definition) = self.custom_definitions.get(&uri) {
            return Ok(definition.clone());
        }
        if namespace == STANDARD_NAMESPACE
            && let Some(definition) = standard_definition(load_name, version)
        {
            return Ok(definition);
        }
        Err(EngineError::LabwareDefinitionNotFound { uri })
    }

    pub fn get(&self, labware_id: &str) -> Result<&LoadedLabware, InvariantViolation> {
        self.labware
            .get(labware_id)
            .ok_or_else(|| InvariantViolation::LabwareNotLoaded {
                labware_id: labware_id.to_string(),
            })
    }

    pub fn get_all(&self) -> impl Iterator<Item = &LoadedLabware> {
        self.labware.values()
    }

    pub fn get_definition(&self, labware_id: &str) -> Result<&LabwareDefinition, InvariantViolation> {
        let labware = self.get(labware_id)?;
        self.definitions
            .get(&labware.definition_uri)
            .ok_or_else(|| InvariantViolation::LabwareNotLoaded {
                labware_id: labware_id.to_string(),
            })
    }

    pub fn get_well(
        &self,
        labware_id: &str,
        well_name: &str,
    ) -> Result<&WellDefinition, InvariantViolation> {
        self.get_definition(labware_id)?
            .well(well_name)
            .ok_or_else(|| InvariantViolation::WellNotFound {
                labware_id: labware_id.to_string(),
                well_name: well_name.to_string(),
            })
    }

    pub fn get_location(&self, labware_id: &str) -> Result<&LabwareLocation, InvariantViolation> {
        Ok(&self.get(labware_id)?.location)
    }

    pub fn get_is_tiprack(&self, labware_id: &str) -> Result<bool, InvariantViolation> {
        Ok(self.get_definition(labware_id)?.parameters.is_tiprack)
    }

    /// Tip length of a tip rack, or `NotATipRack`.
    pub fn get_tip_length(&self, labware_id: &str) -> Result<f64, InvariantViolation> {
        self.get_definition(labware_id)?
            .parameters
            .tip_length
            .ok_or_else(|| InvariantViolation::NotATipRack {
                labware_id: labware_id.to_string(),
            })
    }

    /// Labware sitting directly on `location`, if any.
    pub fn get_labware_at(&self, location: &LabwareLocation) -> Option<&LoadedLabware> {
        if *location == LabwareLocation::OffDeck {
            return None;
        }
        self.labware.values().find(|lw| lw.location == *location)
    }

    /// Whether `ancestor` is `labware_id` or somewhere beneath it in a stack.
    pub fn is_in_stack_of(&self, labware_id: &str, ancestor: &str) -> bool {
        let mut current = Some(labware_id);
        let mut hops = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.labware.len() {
                return false;
            }
            current = match self.labware.get(id).map(|lw| &lw.location) {
                Some(LabwareLocation::OnLabware { labware_id }) => Some(labware_id.as_str()),
                _ => None,
            };
        }
        false
    }

    pub fn get_has_used_tip(&self, labware_id: &str, well_name: &str) -> bool {
        self.used_tips
            .get(labware_id)
            .is_some_and(|wells| wells.contains(well_name))
    }

    pub fn get_custom_definitions(&self) -> impl Iterator<Item = &LabwareDefinition> {
        self.custom_definitions.values()
    }
}
