// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use opentrons_hardware::RobotGeneration;

use crate::recovery::{RetryConfig, RetryStrategy};
use crate::state::StateConfig;

/// Protocol engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Robot generation the run targets.
    pub robot_generation: RobotGeneration,
    /// Pause the run when the front door opens.
    pub block_on_door_open: bool,
    /// Pause for operator recovery on recoverable faults instead of failing.
    pub error_recovery_enabled: bool,
    /// Automatic retry policy for retryable faults.
    pub retry: RetryConfig,
    /// Tolerance for hold-time read-back, equal to the module polling period.
    pub module_polling_window: Duration,
    /// Capacity of the hardware event channel.
    pub event_channel_capacity: usize,
    /// SQLite URL for run history, if persistence is enabled.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            robot_generation: RobotGeneration::Ot2,
            block_on_door_open: true,
            error_recovery_enabled: true,
            retry: RetryConfig::new(2, 250, RetryStrategy::ExponentialBackoff),
            module_polling_window: Duration::from_millis(1000),
            event_channel_capacity: 64,
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `OT_ENGINE_ROBOT_TYPE`: `ot2` or `flex` (default: ot2)
    /// - `OT_ENGINE_BLOCK_ON_DOOR_OPEN`: pause on door open (default: true)
    /// - `OT_ENGINE_ERROR_RECOVERY`: operator recovery enabled (default: true)
    /// - `OT_ENGINE_MAX_RETRIES`: automatic retries per command (default: 2)
    /// - `OT_ENGINE_RETRY_DELAY_MS`: base retry delay (default: 250)
    /// - `OT_ENGINE_MODULE_POLLING_WINDOW_MS`: hold-time tolerance (default: 1000)
    /// - `OT_ENGINE_EVENT_CHANNEL_CAPACITY`: hardware event buffer (default: 64)
    /// - `OT_ENGINE_DATABASE_URL`: SQLite run history (default: disabled)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let robot_generation = match std::env::var("OT_ENGINE_ROBOT_TYPE") {
            Ok(value) => value.parse().map_err(|_| {
                ConfigError::Invalid("OT_ENGINE_ROBOT_TYPE", "must be 'ot2' or 'flex'")
            })?,
            Err(_) => defaults.robot_generation,
        };

        let block_on_door_open =
            parse_bool("OT_ENGINE_BLOCK_ON_DOOR_OPEN", defaults.block_on_door_open)?;
        let error_recovery_enabled =
            parse_bool("OT_ENGINE_ERROR_RECOVERY", defaults.error_recovery_enabled)?;

        let max_retries: u32 = std::env::var("OT_ENGINE_MAX_RETRIES")
            .unwrap_or_else(|_| defaults.retry.max_retries.to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("OT_ENGINE_MAX_RETRIES", "must be a non-negative integer")
            })?;

        let retry_delay_ms: u64 = std::env::var("OT_ENGINE_RETRY_DELAY_MS")
            .unwrap_or_else(|_| defaults.retry.delay_ms.to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("OT_ENGINE_RETRY_DELAY_MS", "must be a non-negative integer")
            })?;

        let polling_window_ms: u64 = std::env::var("OT_ENGINE_MODULE_POLLING_WINDOW_MS")
            .unwrap_or_else(|_| defaults.module_polling_window.as_millis().to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "OT_ENGINE_MODULE_POLLING_WINDOW_MS",
                    "must be a non-negative integer",
                )
            })?;

        let event_channel_capacity: usize = std::env::var("OT_ENGINE_EVENT_CHANNEL_CAPACITY")
            .unwrap_or_else(|_| defaults.event_channel_capacity.to_string())
            .parse()
            .ok()
            .filter(|capacity| *capacity > 0)
            .ok_or(ConfigError::Invalid(
                "OT_ENGINE_EVENT_CHANNEL_CAPACITY",
                "must be a positive integer",
            ))?;

        let database_url = std::env::var("OT_ENGINE_DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());

        Ok(Self {
            robot_generation,
            block_on_door_open,
            error_recovery_enabled,
            retry: RetryConfig::new(max_retries, retry_delay_ms, RetryStrategy::ExponentialBackoff),
            module_polling_window: Duration::from_millis(polling_window_ms),
            event_channel_capacity,
            database_url,
        })
    }

    /// The settings the state reducer depends on.
    pub fn state_config(&self) -> StateConfig {
        StateConfig {
            robot_generation: self.robot_generation,
            block_on_door_open: self.block_on_door_open,
        }
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key, "must be a boolean")),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
