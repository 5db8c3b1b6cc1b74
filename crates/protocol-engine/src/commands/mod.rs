// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Commands: the closed set of robot operations and their lifecycle record.
//!
//! A command on the wire looks like:
//!
//! ```json
//! {
//!   "id": "5c1f...",
//!   "key": "5c1f...",
//!   "commandType": "aspirate",
//!   "params": {"pipetteId": "p1", "labwareId": "plate", "wellName": "A1", "volume": 20},
//!   "intent": "protocol",
//!   "status": "succeeded",
//!   "result": {"kind": "volume", "volume": 20, "position": {"x": 1, "y": 2, "z": 3}},
//!   "createdAt": "...", "startedAt": "...", "completedAt": "..."
//! }
//! ```
//!
//! Command types are a closed enum; parsing an unknown `commandType` fails
//! with [`EngineError::Dispatch`] before anything reaches the queue.

pub mod handlers;
mod params;
mod results;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ErrorOccurrence};

pub use params::*;
pub use results::CommandResult;

/// Lifecycle status. Transitions only forward: queued, running, then final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Waiting in the queue.
    Queued,
    /// Executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl CommandStatus {
    /// Whether no further transition is possible.
    pub fn is_final(self) -> bool {
        matches!(self, CommandStatus::Succeeded | CommandStatus::Failed)
    }
}

/// Why a command was issued; decides which queue it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandIntent {
    /// Part of the protocol.
    #[default]
    Protocol,
    /// Deck setup before the run starts (e.g. calibration moves).
    Setup,
    /// Operator recovery during error recovery.
    Fixit,
}

/// A request to create a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandCreate {
    /// Typed params.
    #[serde(flatten)]
    pub params: CommandParams,
    /// Queue intent.
    #[serde(default)]
    pub intent: CommandIntent,
    /// Client-supplied idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl CommandCreate {
    /// Protocol-intent request with no key.
    pub fn new(params: impl Into<CommandParams>) -> Self {
        Self {
            params: params.into(),
            intent: CommandIntent::Protocol,
            key: None,
        }
    }

    /// Set the intent.
    pub fn with_intent(mut self, intent: CommandIntent) -> Self {
        self.intent = intent;
        self
    }

    /// Set the client key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Command type of the params.
    pub fn command_type(&self) -> CommandType {
        self.params.command_type()
    }

    /// Parse a request from JSON, distinguishing unknown command types from
    /// malformed params.
    pub fn from_value(value: serde_json::Value) -> Result<Self, EngineError> {
        let raw_type = value
            .get("commandType")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| EngineError::InvalidParams {
                command_type: String::new(),
                message: "missing 'commandType'".to_string(),
            })?;
        let command_type: CommandType = raw_type.parse()?;
        serde_json::from_value(value).map_err(|e| EngineError::InvalidParams {
            command_type: command_type.to_string(),
            message: e.to_string(),
        })
    }
}

/// A command and its lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Unique id.
    pub id: String,
    /// Client key, defaulting to the id.
    pub key: String,
    /// Typed params, serialised as `commandType` + `params`.
    #[serde(flatten)]
    pub params: CommandParams,
    /// Queue intent.
    pub intent: CommandIntent,
    /// Lifecycle status.
    pub status: CommandStatus,
    /// Result payload once succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    /// Error once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorOccurrence>,
    /// When queued.
    pub created_at: DateTime<Utc>,
    /// When execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when this command never ran because another command failed the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_command_id: Option<String>,
}

impl Command {
    /// Command type of the params.
    pub fn command_type(&self) -> CommandType {
        self.params.command_type()
    }
}

macro_rules! command_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Closed set of command types.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandType {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl CommandType {
            /// Every command type.
            pub const ALL: &'static [CommandType] = &[$(CommandType::$variant),+];

            /// Wire name.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(CommandType::$variant => $name,)+
                }
            }
        }

        impl CommandParams {
            /// Command type of these params.
            pub fn command_type(&self) -> CommandType {
                match self {
                    $(CommandParams::$variant(_) => CommandType::$variant,)+
                }
            }
        }
    };
}

command_types! {
    Home => "home",
    LoadLabware => "loadLabware",
    LoadPipette => "loadPipette",
    LoadModule => "loadModule",
    LoadLiquid => "loadLiquid",
    MoveToWell => "moveToWell",
    MoveLabware => "moveLabware",
    PickUpTip => "pickUpTip",
    DropTip => "dropTip",
    Aspirate => "aspirate",
    Dispense => "dispense",
    BlowOut => "blowOut",
    LiquidProbe => "liquidProbe",
    ConfigureNozzleLayout => "configureNozzleLayout",
    WaitForResume => "waitForResume",
    WaitForDuration => "waitForDuration",
    TemperatureModuleSetTargetTemperature => "temperatureModule/setTargetTemperature",
    TemperatureModuleWaitForTemperature => "temperatureModule/waitForTemperature",
    TemperatureModuleDeactivate => "temperatureModule/deactivate",
    ThermocyclerSetTargetBlockTemperature => "thermocycler/setTargetBlockTemperature",
    HeaterShakerSetTargetTemperature => "heaterShaker/setTargetTemperature",
    HeaterShakerSetAndWaitForShakeSpeed => "heaterShaker/setAndWaitForShakeSpeed",
    MagneticModuleEngage => "magneticModule/engage",
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "pause" {
            return Ok(CommandType::WaitForResume);
        }
        CommandType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::Dispatch {
                command_type: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_type_names_round_trip() {
        for command_type in CommandType::ALL {
            let parsed: CommandType = command_type.as_str().parse().unwrap();
            assert_eq!(parsed, *command_type);
        }
        assert_eq!(
            "pause".parse::<CommandType>().unwrap(),
            CommandType::WaitForResume
        );
    }

    #[test]
    fn test_unknown_command_type_is_dispatch_error() {
        let err = CommandCreate::from_value(json!({
            "commandType": "makeCoffee",
            "params": {}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::Dispatch {
                command_type: "makeCoffee".into()
            }
        );
    }

    #[test]
    fn test_malformed_params_are_invalid_params() {
        let err = CommandCreate::from_value(json!({
            "commandType": "aspirate",
            "params": {"pipetteId": "p1"}
        }))
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMS");
    }

    #[test]
    fn test_parse_namespaced_command() {
        let request = CommandCreate::from_value(json!({
            "commandType": "thermocycler/setTargetBlockTemperature",
            "params": {"moduleId": "tc", "celsius": 95, "holdTimeSeconds": 30},
            "intent": "protocol"
        }))
        .unwrap();
        assert_eq!(
            request.command_type(),
            CommandType::ThermocyclerSetTargetBlockTemperature
        );
        match request.params {
            CommandParams::ThermocyclerSetTargetBlockTemperature(p) => {
                assert_eq!(p.celsius, 95.0);
                assert_eq!(p.hold_time_seconds, Some(30.0));
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_pause_alias_parses_as_wait_for_resume() {
        let request = CommandCreate::from_value(json!({
            "commandType": "pause",
            "params": {"message": "check the deck"}
        }))
        .unwrap();
        assert_eq!(request.command_type(), CommandType::WaitForResume);
    }

    #[test]
    fn test_command_wire_shape() {
        let command = Command {
            id: "c1".into(),
            key: "c1".into(),
            params: CommandParams::Home(HomeParams::default()),
            intent: CommandIntent::Setup,
            status: CommandStatus::Queued,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_command_id: None,
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["commandType"], "home");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["intent"], "setup");
        assert!(value.get("params").is_some());
        assert!(value.get("result").is_none());

        let back: Command = serde_json::from_value(value).unwrap();
        assert_eq!(back, command);
    }
}
