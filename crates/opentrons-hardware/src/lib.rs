// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Opentrons Hardware - device interface for the protocol engine
//!
//! This crate defines the boundary between the protocol engine and the robot:
//!
//! - [`MotionController`]: gantry capabilities (`home`, `move_to`, `probe`)
//! - [`HardwareControl`]: pipetting and module operations built on motion
//! - [`HardwareError`]: the fixed fault taxonomy every operation may return
//! - [`HardwareEvent`] / [`HardwareEventSource`]: door, estop and module
//!   status events delivered by callback, possibly from a driver thread
//! - [`SimulatedHardware`]: an in-process robot with fault injection
//!
//! # Generations
//!
//! Robot generations are a tag ([`RobotGeneration`]) chosen when a backend is
//! constructed. Behaviour that differs between generations (door interlock,
//! deck slot naming, speed limits) is queried from the tag.
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │   HardwareControl    │  pick_up_tip, aspirate, modules...
//!                 └──────────┬───────────┘
//!                            │ extends
//!                 ┌──────────▼───────────┐
//!                 │   MotionController   │  home, move_to, probe
//!                 └──────────┬───────────┘
//!                            │ generation()
//!                 ┌──────────▼───────────┐
//!                 │   RobotGeneration    │  Ot2 | Flex
//!                 └──────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod control;
pub mod error;
pub mod events;
pub mod simulator;
pub mod types;

pub use control::{HardwareControl, MotionController};
pub use error::HardwareError;
pub use events::{
    CallbackRegistry, EventCallback, HardwareEvent, HardwareEventSource, SubscriptionId,
};
pub use simulator::{ModulePoller, SimulatedHardware};
pub use types::{
    AttachedModule, Axis, DoorState, HardwareOperation, ModuleModel, ModuleReading, ModuleStatus,
    ModuleType, Mount, Point, RobotGeneration,
};
