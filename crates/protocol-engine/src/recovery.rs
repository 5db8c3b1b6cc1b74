// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error recovery policy.
//!
//! A failed command is classified into a [`FaultClass`] and the policy turns
//! that into a [`Disposition`] for the engine loop:
//!
//! ```text
//!   Retryable ──(attempts < max)──► Retry { delay }
//!       │
//!       └──(exhausted)──► RecoverableWithOperator ──► AwaitRecovery
//!                                                      (FailRun when recovery is disabled)
//!   Fatal ───────────────────────────────────────────► FailRun
//! ```
//!
//! Invariant violations are always fatal.

use std::time::Duration;

use opentrons_hardware::HardwareError;

use crate::actions::ErrorRecoveryType;
use crate::commands::CommandIntent;
use crate::error::EngineError;

/// Retry strategy for retryable faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Exponential backoff: delay * 2^(attempt-1)
    #[default]
    ExponentialBackoff,
}

/// Automatic retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of automatic retries (0 = escalate immediately).
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub delay_ms: u64,
    /// Retry strategy for calculating delays.
    pub strategy: RetryStrategy,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_retries: u32, delay_ms: u64, strategy: RetryStrategy) -> Self {
        Self {
            max_retries,
            delay_ms,
            strategy,
        }
    }

    /// Delay before the given retry attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = match self.strategy {
            RetryStrategy::ExponentialBackoff => 2u64.saturating_pow(attempt.saturating_sub(1)),
        };
        Duration::from_millis(self.delay_ms.saturating_mul(multiplier))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(2, 250, RetryStrategy::default())
    }
}

/// How bad a fault is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// Transient; may succeed if tried again.
    Retryable,
    /// Needs the operator to fix something on the deck.
    RecoverableWithOperator,
    /// Run cannot continue.
    Fatal,
}

/// Classify an error raised by a command handler.
pub fn classify(error: &EngineError) -> FaultClass {
    match error {
        EngineError::Hardware(fault) => match fault {
            HardwareError::LiquidPresenceMismatch { .. }
            | HardwareError::ModuleNotResponding { .. } => FaultClass::Retryable,
            HardwareError::TipPickupFailed { .. }
            | HardwareError::TipDropFailed { .. }
            | HardwareError::Overpressure { .. }
            | HardwareError::Stall { .. }
            | HardwareError::Collision { .. }
            | HardwareError::LiquidNotFound { .. } => FaultClass::RecoverableWithOperator,
            HardwareError::DoorOpenDuringMotion
            | HardwareError::EstopActivated
            | HardwareError::ModuleNotFound { .. } => FaultClass::Fatal,
        },
        _ => FaultClass::Fatal,
    }
}

/// What the engine loop does with a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Run the same command again after `delay`; it stays RUNNING.
    Retry { delay: Duration },
    /// Fail the command and wait for operator recovery.
    AwaitRecovery,
    /// Fail the command and the run.
    FailRun,
    /// Fail the command and move on.
    IgnoreAndContinue,
}

impl Disposition {
    /// Recovery type recorded on the fail action. `None` for retries, which
    /// do not fail the command.
    pub fn recovery_type(self) -> Option<ErrorRecoveryType> {
        match self {
            Disposition::Retry { .. } => None,
            Disposition::AwaitRecovery => Some(ErrorRecoveryType::WaitForRecovery),
            Disposition::FailRun => Some(ErrorRecoveryType::FailRun),
            Disposition::IgnoreAndContinue => Some(ErrorRecoveryType::IgnoreAndContinue),
        }
    }
}

/// Decides the fate of failed commands.
pub trait ErrorRecoveryPolicy: Send + Sync {
    /// `retries` is the number of automatic retries already made for this
    /// command.
    fn decide(&self, error: &EngineError, intent: CommandIntent, retries: u32) -> Disposition;
}

/// Default policy: bounded retries, then operator recovery if enabled.
#[derive(Debug, Clone)]
pub struct StandardRecoveryPolicy {
    retry: RetryConfig,
    recovery_enabled: bool,
}

impl StandardRecoveryPolicy {
    pub fn new(retry: RetryConfig, recovery_enabled: bool) -> Self {
        Self {
            retry,
            recovery_enabled,
        }
    }
}

impl Default for StandardRecoveryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default(), true)
    }
}

impl ErrorRecoveryPolicy for StandardRecoveryPolicy {
    fn decide(&self, error: &EngineError, intent: CommandIntent, retries: u32) -> Disposition {
        let class = classify(error);
        if class == FaultClass::Fatal {
            return Disposition::FailRun;
        }

        match intent {
            CommandIntent::Setup => Disposition::IgnoreAndContinue,
            // A failed fixit command leaves the run in recovery.
            CommandIntent::Fixit => Disposition::AwaitRecovery,
            CommandIntent::Protocol => {
                if class == FaultClass::Retryable && retries < self.retry.max_retries {
                    return Disposition::Retry {
                        delay: self.retry.delay_for_attempt(retries + 1),
                    };
                }
                if self.recovery_enabled {
                    Disposition::AwaitRecovery
                } else {
                    Disposition::FailRun
                }
            }
        }
    }
}
