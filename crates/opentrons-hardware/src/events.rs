// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Asynchronous hardware events.
//!
//! Hardware events originate on whatever thread the device driver runs on.
//! Sources deliver them through registered callbacks; consumers that need
//! to cross into an async runtime do so on their side of the callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{DoorState, ModuleReading};

/// Event raised by the robot outside of any command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HardwareEvent {
    /// Front door opened or closed.
    DoorStateChanged {
        /// New door state.
        state: DoorState,
    },
    /// Emergency stop pressed.
    EstopEngaged,
    /// Emergency stop released.
    EstopReleased,
    /// A module's poller produced a new reading.
    ModuleStatus {
        /// Module serial number.
        serial: String,
        /// The reading.
        reading: ModuleReading,
    },
}

/// Callback invoked for every hardware event.
///
/// May be called from any thread, and may block that thread.
pub type EventCallback = Arc<dyn Fn(HardwareEvent) + Send + Sync>;

/// Handle returned by [`HardwareEventSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Producer of hardware events.
pub trait HardwareEventSource: Send + Sync {
    /// Register a callback. Each call creates an independent subscription.
    fn subscribe(&self, callback: EventCallback) -> SubscriptionId;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Subscriber registry shared by event source implementations.
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, EventCallback)>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscribers", &self.callbacks.read().len())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Whether there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every subscriber on the calling thread.
    ///
    /// Callbacks run outside the registry lock so a blocking subscriber
    /// cannot stall `subscribe`/`unsubscribe`.
    pub fn publish(&self, event: &HardwareEvent) {
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}

impl HardwareEventSource for CallbackRegistry {
    fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, callback));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.callbacks.write().retain(|(existing, _)| *existing != id);
    }
}
