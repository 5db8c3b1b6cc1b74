// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hardware fault taxonomy.
//!
//! Every operation on [`crate::HardwareControl`] either succeeds or returns
//! one of these faults. The set is fixed; callers classify faults by variant.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Axis, HardwareOperation, Mount};

/// Result type using HardwareError
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Faults raised by the hardware device interface.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HardwareError {
    /// Pressure sensor tripped while moving the plunger.
    #[error("Overpressure detected on {mount} pipette during {operation}")]
    Overpressure {
        /// Mount of the affected pipette.
        mount: Mount,
        /// Plunger operation in progress.
        operation: HardwareOperation,
    },

    /// Tip presence sensor did not confirm a tip after pick-up.
    #[error("Tip pick-up failed on {mount} pipette")]
    TipPickupFailed {
        /// Mount of the affected pipette.
        mount: Mount,
    },

    /// Tip presence sensor still reports a tip after drop.
    #[error("Tip drop failed on {mount} pipette")]
    TipDropFailed {
        /// Mount of the affected pipette.
        mount: Mount,
    },

    /// Liquid presence sensing disagreed with the expected well contents.
    #[error(
        "Liquid presence mismatch on {mount} pipette: expected liquid {expected}, detected {detected}"
    )]
    LiquidPresenceMismatch {
        /// Mount of the affected pipette.
        mount: Mount,
        /// Whether liquid was expected.
        expected: bool,
        /// Whether liquid was detected.
        detected: bool,
    },

    /// Probe reached the bottom of the well without finding liquid.
    #[error("No liquid found by {mount} pipette")]
    LiquidNotFound {
        /// Mount of the probing pipette.
        mount: Mount,
    },

    /// Motor stall on an axis.
    #[error("Motor stall detected on axis {axis}")]
    Stall {
        /// Stalled axis.
        axis: Axis,
    },

    /// Collision detected by the motion controller.
    #[error("Collision detected while moving {mount} mount")]
    Collision {
        /// Mount that was moving.
        mount: Mount,
    },

    /// Door opened while the gantry was moving on a robot with an interlock.
    #[error("Front door opened during motion")]
    DoorOpenDuringMotion,

    /// Module did not acknowledge or apply a command.
    #[error("Module '{serial}' did not respond: {detail}")]
    ModuleNotResponding {
        /// Module serial number.
        serial: String,
        /// What went wrong.
        detail: String,
    },

    /// No module with this serial is attached.
    #[error("Module '{serial}' is not attached")]
    ModuleNotFound {
        /// Module serial number or model that was requested.
        serial: String,
    },

    /// Emergency stop is engaged.
    #[error("Emergency stop activated")]
    EstopActivated,
}

impl HardwareError {
    /// Get the error code string for this fault.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Overpressure { .. } => "OVERPRESSURE",
            Self::TipPickupFailed { .. } => "TIP_PICKUP_FAILED",
            Self::TipDropFailed { .. } => "TIP_DROP_FAILED",
            Self::LiquidPresenceMismatch { .. } => "LIQUID_PRESENCE_MISMATCH",
            Self::LiquidNotFound { .. } => "LIQUID_NOT_FOUND",
            Self::Stall { .. } => "STALL",
            Self::Collision { .. } => "COLLISION",
            Self::DoorOpenDuringMotion => "DOOR_OPEN_DURING_MOTION",
            Self::ModuleNotResponding { .. } => "MODULE_NOT_RESPONDING",
            Self::ModuleNotFound { .. } => "MODULE_NOT_FOUND",
            Self::EstopActivated => "ESTOP_ACTIVATED",
        }
    }

    /// Short type name, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Overpressure { .. } => "Overpressure",
            Self::TipPickupFailed { .. } => "TipPickupFailed",
            Self::TipDropFailed { .. } => "TipDropFailed",
            Self::LiquidPresenceMismatch { .. } => "LiquidPresenceMismatch",
            Self::LiquidNotFound { .. } => "LiquidNotFound",
            Self::Stall { .. } => "Stall",
            Self::Collision { .. } => "Collision",
            Self::DoorOpenDuringMotion => "DoorOpenDuringMotion",
            Self::ModuleNotResponding { .. } => "ModuleNotResponding",
            Self::ModuleNotFound { .. } => "ModuleNotFound",
            Self::EstopActivated => "EstopActivated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_messages() {
        let err = HardwareError::Overpressure {
            mount: Mount::Left,
            operation: HardwareOperation::Aspirate,
        };
        assert_eq!(err.error_code(), "OVERPRESSURE");
        assert_eq!(
            err.to_string(),
            "Overpressure detected on left pipette during aspirate"
        );

        let err = HardwareError::Stall { axis: Axis::ZRight };
        assert_eq!(err.to_string(), "Motor stall detected on axis Z_R");
        assert_eq!(err.kind(), "Stall");
    }

    #[test]
    fn test_error_serializes_with_kind_tag() {
        let err = HardwareError::TipPickupFailed { mount: Mount::Right };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "tipPickupFailed");
        assert_eq!(json["mount"], "right");
    }
}
