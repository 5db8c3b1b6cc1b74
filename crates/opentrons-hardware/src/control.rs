// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Device interface traits.
//!
//! [`MotionController`] is the narrow capability set every motion backend
//! provides. [`HardwareControl`] layers pipetting and module operations on
//! top of it and is what the protocol engine consumes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AttachedModule, Axis, ModuleReading, Mount, Point, RobotGeneration};

/// Gantry motion capabilities.
#[async_trait]
pub trait MotionController: Send + Sync {
    /// Hardware generation this controller drives.
    fn generation(&self) -> RobotGeneration;

    /// Home the given axes, or every axis when `axes` is empty.
    async fn home(&self, axes: &[Axis]) -> Result<()>;

    /// Move a mount's critical point to `target`.
    async fn move_to(&self, mount: Mount, target: Point, speed: Option<f64>) -> Result<()>;

    /// Probe downward from `start` for a liquid surface.
    ///
    /// Returns the surface height, or `None` when the probe reached the
    /// bottom without contact.
    async fn probe(&self, mount: Mount, start: Point) -> Result<Option<f64>>;
}

/// Full device interface consumed by command handlers.
#[async_trait]
pub trait HardwareControl: MotionController {
    /// Pick up a tip at the current position.
    async fn pick_up_tip(&self, mount: Mount, tip_length: f64) -> Result<()>;

    /// Drop the attached tip at the current position.
    async fn drop_tip(&self, mount: Mount) -> Result<()>;

    /// Aspirate `volume` µL at `flow_rate` µL/s.
    async fn aspirate(&self, mount: Mount, volume: f64, flow_rate: f64) -> Result<()>;

    /// Dispense `volume` µL at `flow_rate` µL/s.
    async fn dispense(&self, mount: Mount, volume: f64, flow_rate: f64) -> Result<()>;

    /// Push the plunger past bottom to clear the tip.
    async fn blow_out(&self, mount: Mount) -> Result<()>;

    /// Probe for liquid at `well_top`, returning whether any was found.
    async fn detect_liquid_presence(&self, mount: Mount, well_top: Point) -> Result<bool> {
        Ok(self.probe(mount, well_top).await?.is_some())
    }

    /// Modules currently attached.
    async fn attached_modules(&self) -> Result<Vec<AttachedModule>>;

    /// Set a module's target temperature, optionally with a hold duration.
    async fn module_set_temperature(
        &self,
        serial: &str,
        celsius: f64,
        hold: Option<Duration>,
    ) -> Result<()>;

    /// Wait until the module reports it is holding at target.
    async fn module_await_temperature(&self, serial: &str) -> Result<()>;

    /// Turn off heating, cooling, shaking and magnets.
    async fn module_deactivate(&self, serial: &str) -> Result<()>;

    /// Read the module's current status.
    async fn module_status(&self, serial: &str) -> Result<ModuleReading>;

    /// Set heater-shaker speed and wait until it is reached.
    async fn set_shake_speed(&self, serial: &str, rpm: u32) -> Result<()>;

    /// Raise magnets to `height` mm.
    async fn engage_magnets(&self, serial: &str, height: f64) -> Result<()>;

    /// Stop all motion. Called once when a run ends.
    async fn halt(&self) -> Result<()>;
}
