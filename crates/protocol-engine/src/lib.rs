// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protocol Engine - command execution core for Opentrons protocols
//!
//! The engine accepts commands (load labware, pick up a tip, aspirate, set a
//! module temperature), queues them, runs them one at a time against a
//! [`HardwareControl`](opentrons_hardware::HardwareControl) implementation and
//! keeps an authoritative picture of the deck: labware, pipettes, tips,
//! liquid volumes and module targets.
//!
//! # Architecture
//!
//! ```text
//!   clients ──► ProtocolEngine ──requests──► engine task ◄──events── hardware threads
//!                     ▲                          │
//!                     │ watch / broadcast        ▼
//!                     └────────────────── ActionDispatcher ──► State (immutable snapshots)
//!                                                │
//!                                                └──► RunHistory (SQLite)
//! ```
//!
//! Every change to run state is an [`Action`](actions::Action). The engine
//! task is the only dispatcher; handlers describe their effects as a
//! [`StateUpdate`](state::StateUpdate) and the reducer applies it. Replaying
//! the action log rebuilds an identical state.
//!
//! # Run Lifecycle
//!
//! ```text
//!   idle ──play──► running ◄──play── paused
//!                   │  │ ▲             ▲
//!                   │  │ └─resume──┐   │ pause / door open
//!                   │  ▼           │   │
//!                   │ awaiting-recovery
//!                   ▼
//!   stop-requested / finishing ──hardware halted──► stopped | failed | succeeded
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OT_ENGINE_ROBOT_TYPE` | `ot2` | Robot generation (`ot2` or `flex`) |
//! | `OT_ENGINE_BLOCK_ON_DOOR_OPEN` | `true` | Pause when the door opens |
//! | `OT_ENGINE_ERROR_RECOVERY` | `true` | Offer operator recovery |
//! | `OT_ENGINE_MAX_RETRIES` | `2` | Automatic retries for retryable faults |
//! | `OT_ENGINE_RETRY_DELAY_MS` | `250` | Base retry delay |
//! | `OT_ENGINE_MODULE_POLLING_WINDOW_MS` | `1000` | Hold-time read-back tolerance |
//! | `OT_ENGINE_EVENT_CHANNEL_CAPACITY` | `64` | Hardware event buffer |
//! | `OT_ENGINE_DATABASE_URL` | - | SQLite run history |
//!
//! # Modules
//!
//! - [`actions`]: The action vocabulary and the action log
//! - [`commands`]: Command types, params, results and handlers
//! - [`config`]: Engine configuration from environment variables
//! - [`definitions`]: Labware definitions and URIs
//! - [`dispatcher`]: Single-writer action dispatch and notifications
//! - [`engine`]: The engine task and its client handle
//! - [`error`]: Error types with stable error codes
//! - [`forwarder`]: Hardware callback to engine message bridge
//! - [`history`]: Run history persistence
//! - [`queue`]: Command queue ordering
//! - [`recovery`]: Fault classification and recovery policy
//! - [`state`]: State stores and read-only views

pub mod actions;
pub mod commands;
pub mod config;
pub mod definitions;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod forwarder;
pub mod history;
pub mod queue;
pub mod recovery;
pub mod state;
pub mod types;

pub use actions::{Action, ActionLogEntry, ErrorRecoveryType, Liquid};
pub use commands::{Command, CommandCreate, CommandIntent, CommandParams, CommandResult, CommandStatus};
pub use config::EngineConfig;
pub use dispatcher::{Notification, NotificationEvent};
pub use engine::{ProtocolEngine, ProtocolEngineBuilder};
pub use error::{EngineError, ErrorOccurrence, Result};
pub use history::{InMemoryRunHistory, RunHistory, SqliteRunHistory};
pub use state::{EngineStatus, RunResult, State};
