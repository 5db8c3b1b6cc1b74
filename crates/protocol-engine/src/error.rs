// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the protocol engine.
//!
//! [`EngineError`] is returned synchronously to callers that attempt an
//! illegal mutation, and is also what command handlers fail with. Failed
//! commands store an [`ErrorOccurrence`], the serialisable record of an
//! error at the moment it happened.

use chrono::{DateTime, Utc};
use opentrons_hardware::{HardwareError, Mount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the engine and its command handlers.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Setup-intent command issued after the run left the setup phase.
    #[error("Setup command '{command_type}' is not allowed after the run has started")]
    SetupCommandNotAllowed {
        /// Rejected command type.
        command_type: String,
    },

    /// Fixit-intent command issued while the run is not awaiting recovery.
    #[error("Fixit command '{command_type}' is only allowed during error recovery")]
    FixitCommandNotAllowed {
        /// Rejected command type.
        command_type: String,
    },

    /// Command type is outside the closed command set.
    #[error("No handler for command type '{command_type}'")]
    Dispatch {
        /// The unroutable command type.
        command_type: String,
    },

    /// Params did not match the schema for their command type.
    #[error("Invalid params for '{command_type}': {message}")]
    InvalidParams {
        /// Command type being parsed.
        command_type: String,
        /// Parser message.
        message: String,
    },

    /// More than one custom labware definition matches a load request.
    #[error(
        "Multiple custom definitions match labware '{load_name}' ({candidates}); specify namespace and version"
    )]
    AmbiguousLoadLabwareParams {
        /// Requested load name.
        load_name: String,
        /// URIs of the matching definitions.
        candidates: String,
    },

    /// No labware definition for the resolved URI.
    #[error("Labware definition '{uri}' not found")]
    LabwareDefinitionNotFound {
        /// Resolved `namespace/loadName/version`.
        uri: String,
    },

    /// No attached module of the requested model is available.
    #[error("No unused module of model '{model}' is attached")]
    ModuleNotAttached {
        /// Requested model.
        model: String,
    },

    /// Parameter outside the range the target accepts.
    #[error("{parameter} {value} is outside the allowed range {min}..={max}")]
    InvalidTarget {
        /// Parameter name.
        parameter: String,
        /// Requested value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// Fault raised by the hardware device interface.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Command sequencing broke a state invariant.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// Run is not in a state that accepts this mutation.
    #[error("Run conflict: {reason}")]
    RunConflict {
        /// Why the mutation was refused.
        reason: String,
    },

    /// Run has been stopped, failed, or finished.
    #[error("The run has been stopped; no further commands will execute")]
    RunStopped,

    /// Pause requested while the run is not running.
    #[error("Cannot pause a run that is {status}")]
    PauseNotAllowed {
        /// Current engine status.
        status: String,
    },

    /// Resume-from-recovery requested at the wrong time.
    #[error("Cannot resume from recovery: {reason}")]
    ResumeFromRecoveryNotAllowed {
        /// Why the resume was refused.
        reason: String,
    },

    /// Play requested while the front door blocks the run.
    #[error("Front door is open; close it before resuming the run")]
    RobotDoorOpen,

    /// Command id is unknown.
    #[error("Command '{command_id}' not found")]
    CommandNotFound {
        /// The unknown id.
        command_id: String,
    },

    /// The engine task has exited.
    #[error("Protocol engine is no longer running")]
    EngineClosed,

    /// Run history storage failed.
    #[error("Persistence error during '{operation}': {details}")]
    Persistence {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl EngineError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SetupCommandNotAllowed { .. } => "SETUP_COMMAND_NOT_ALLOWED",
            Self::FixitCommandNotAllowed { .. } => "FIXIT_COMMAND_NOT_ALLOWED",
            Self::Dispatch { .. } => "DISPATCH_ERROR",
            Self::InvalidParams { .. } => "INVALID_PARAMS",
            Self::AmbiguousLoadLabwareParams { .. } => "AMBIGUOUS_LOAD_LABWARE_PARAMS",
            Self::LabwareDefinitionNotFound { .. } => "LABWARE_DEFINITION_NOT_FOUND",
            Self::ModuleNotAttached { .. } => "MODULE_NOT_ATTACHED",
            Self::InvalidTarget { .. } => "INVALID_TARGET",
            Self::Hardware(err) => err.error_code(),
            Self::Invariant(violation) => violation.error_code(),
            Self::RunConflict { .. } => "RUN_CONFLICT",
            Self::RunStopped => "RUN_STOPPED",
            Self::PauseNotAllowed { .. } => "PAUSE_NOT_ALLOWED",
            Self::ResumeFromRecoveryNotAllowed { .. } => "RESUME_FROM_RECOVERY_NOT_ALLOWED",
            Self::RobotDoorOpen => "ROBOT_DOOR_OPEN",
            Self::CommandNotFound { .. } => "COMMAND_NOT_FOUND",
            Self::EngineClosed => "ENGINE_CLOSED",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
        }
    }

    /// Error type name recorded on failed commands.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::SetupCommandNotAllowed { .. } => "SetupCommandNotAllowedError",
            Self::FixitCommandNotAllowed { .. } => "FixitCommandNotAllowedError",
            Self::Dispatch { .. } => "DispatchError",
            Self::InvalidParams { .. } => "InvalidParamsError",
            Self::AmbiguousLoadLabwareParams { .. } => "AmbiguousLoadLabwareParamsError",
            Self::LabwareDefinitionNotFound { .. } => "LabwareDefinitionNotFoundError",
            Self::ModuleNotAttached { .. } => "ModuleNotAttachedError",
            Self::InvalidTarget { .. } => "InvalidTargetError",
            Self::Hardware(err) => err.kind(),
            Self::Invariant(_) => "InvariantViolation",
            Self::RunConflict { .. } => "RunConflictError",
            Self::RunStopped => "RunStoppedError",
            Self::PauseNotAllowed { .. } => "PauseNotAllowedError",
            Self::ResumeFromRecoveryNotAllowed { .. } => "ResumeFromRecoveryNotAllowedError",
            Self::RobotDoorOpen => "RobotDoorOpenError",
            Self::CommandNotFound { .. } => "CommandNotFoundError",
            Self::EngineClosed => "EngineClosedError",
            Self::Persistence { .. } => "PersistenceError",
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Persistence {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Persistence {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

/// State invariant broken by a command. Always fatal to the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    /// Liquid handling attempted without a tip.
    #[error("Pipette '{pipette_id}' has no tip attached")]
    NoTipAttached {
        /// Pipette id.
        pipette_id: String,
    },

    /// Tip pick-up attempted while a tip is attached.
    #[error("Pipette '{pipette_id}' already has a tip attached")]
    TipAlreadyAttached {
        /// Pipette id.
        pipette_id: String,
    },

    /// Aspirate would exceed the pipette's working volume.
    #[error(
        "Cannot aspirate {requested} µL with pipette '{pipette_id}': only {available} µL of {working_volume} µL capacity remains"
    )]
    PipetteVolumeExceeded {
        /// Pipette id.
        pipette_id: String,
        /// Requested volume.
        requested: f64,
        /// Remaining capacity.
        available: f64,
        /// Working volume with the current tip.
        working_volume: f64,
    },

    /// Dispense of more than is held.
    #[error(
        "Cannot dispense {requested} µL from pipette '{pipette_id}': only {aspirated} µL aspirated"
    )]
    DispenseExceedsAspirated {
        /// Pipette id.
        pipette_id: String,
        /// Requested volume.
        requested: f64,
        /// Volume currently held.
        aspirated: f64,
    },

    /// Aspirated volume unknown after a fault; blow out or replace the tip.
    #[error("Aspirated volume of pipette '{pipette_id}' is unknown")]
    AspiratedVolumeUnknown {
        /// Pipette id.
        pipette_id: String,
    },

    /// Aspirate of more liquid than the well holds.
    #[error(
        "Cannot aspirate {requested} µL from well {well_name} of '{labware_id}': it holds {available} µL"
    )]
    OverAspiration {
        /// Labware id.
        labware_id: String,
        /// Well name.
        well_name: String,
        /// Requested volume.
        requested: f64,
        /// Tracked volume.
        available: f64,
    },

    /// Negative volume in params.
    #[error("Volume must not be negative, got {volume}")]
    NegativeVolume {
        /// Offending volume.
        volume: f64,
    },

    /// NaN or infinite volume in params.
    #[error("Volume must be a finite number, got {volume}")]
    NonFiniteVolume {
        /// Offending volume.
        volume: f64,
    },

    /// Dispense would overflow a well.
    #[error(
        "Dispensing into well {well_name} of '{labware_id}' would hold {volume} µL, exceeding its {capacity} µL capacity"
    )]
    WellCapacityExceeded {
        /// Labware id.
        labware_id: String,
        /// Well name.
        well_name: String,
        /// Resulting volume.
        volume: f64,
        /// Well capacity.
        capacity: f64,
    },

    /// Pipette id not loaded.
    #[error("Pipette '{pipette_id}' is not loaded")]
    PipetteNotLoaded {
        /// Pipette id.
        pipette_id: String,
    },

    /// Labware id not loaded.
    #[error("Labware '{labware_id}' is not loaded")]
    LabwareNotLoaded {
        /// Labware id.
        labware_id: String,
    },

    /// Module id not loaded.
    #[error("Module '{module_id}' is not loaded")]
    ModuleNotLoaded {
        /// Module id.
        module_id: String,
    },

    /// Module is loaded but is the wrong kind for the command.
    #[error("Module '{module_id}' is not a {expected}")]
    WrongModuleType {
        /// Module id.
        module_id: String,
        /// Required module family.
        expected: String,
    },

    /// Liquid id not defined.
    #[error("Liquid '{liquid_id}' is not defined")]
    LiquidNotDefined {
        /// Liquid id.
        liquid_id: String,
    },

    /// Well name not in the labware definition.
    #[error("Labware '{labware_id}' has no well {well_name}")]
    WellNotFound {
        /// Labware id.
        labware_id: String,
        /// Well name.
        well_name: String,
    },

    /// Labware used as a tip rack is not one.
    #[error("Labware '{labware_id}' is not a tip rack")]
    NotATipRack {
        /// Labware id.
        labware_id: String,
    },

    /// Labware has no deck position.
    #[error("Labware '{labware_id}' is off-deck")]
    LabwareOffDeck {
        /// Labware id.
        labware_id: String,
    },

    /// Deck slot unknown for this robot generation.
    #[error("Deck slot '{slot_name}' does not exist")]
    SlotNotFound {
        /// Slot name.
        slot_name: String,
    },

    /// Target location already holds something.
    #[error("Location {location} is already occupied")]
    LocationOccupied {
        /// Human-readable location.
        location: String,
    },

    /// A pipette is already loaded on the mount.
    #[error("Mount {mount} already has a pipette loaded")]
    MountOccupied {
        /// Occupied mount.
        mount: Mount,
    },
}

impl InvariantViolation {
    /// Get the error code string for this violation.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoTipAttached { .. } => "NO_TIP_ATTACHED",
            Self::TipAlreadyAttached { .. } => "TIP_ALREADY_ATTACHED",
            Self::PipetteVolumeExceeded { .. } => "PIPETTE_VOLUME_EXCEEDED",
            Self::DispenseExceedsAspirated { .. } => "DISPENSE_EXCEEDS_ASPIRATED",
            Self::AspiratedVolumeUnknown { .. } => "ASPIRATED_VOLUME_UNKNOWN",
            Self::OverAspiration { .. } => "OVER_ASPIRATION",
            Self::NegativeVolume { .. } => "NEGATIVE_VOLUME",
            Self::NonFiniteVolume { .. } => "NON_FINITE_VOLUME",
            Self::WellCapacityExceeded { .. } => "WELL_CAPACITY_EXCEEDED",
            Self::PipetteNotLoaded { .. } => "PIPETTE_NOT_LOADED",
            Self::LabwareNotLoaded { .. } => "LABWARE_NOT_LOADED",
            Self::ModuleNotLoaded { .. } => "MODULE_NOT_LOADED",
            Self::WrongModuleType { .. } => "WRONG_MODULE_TYPE",
            Self::LiquidNotDefined { .. } => "LIQUID_NOT_DEFINED",
            Self::WellNotFound { .. } => "WELL_NOT_FOUND",
            Self::NotATipRack { .. } => "NOT_A_TIP_RACK",
            Self::LabwareOffDeck { .. } => "LABWARE_OFF_DECK",
            Self::SlotNotFound { .. } => "SLOT_NOT_FOUND",
            Self::LocationOccupied { .. } => "LOCATION_OCCUPIED",
            Self::MountOccupied { .. } => "MOUNT_OCCUPIED",
        }
    }
}

/// Serialisable record of an error attached to a failed command or run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOccurrence {
    /// Unique id of this occurrence.
    pub id: String,
    /// When the error happened.
    pub created_at: DateTime<Utc>,
    /// Error type name.
    pub error_type: String,
    /// Stable error code.
    pub error_code: String,
    /// Human-readable detail.
    pub detail: String,
    /// Whether the error is a defined, operator-recoverable fault.
    pub is_defined: bool,
}

impl ErrorOccurrence {
    /// Capture `error` as an occurrence.
    pub fn from_error(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        error: &EngineError,
        is_defined: bool,
    ) -> Self {
        Self {
            id: id.into(),
            created_at,
            error_type: error.error_type().to_string(),
            error_code: error.error_code().to_string(),
            detail: error.to_string(),
            is_defined,
        }
    }
}
