// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hardware event forwarder.
//!
//! Hardware callbacks run on driver threads. The forwarder turns each
//! callback into a message on a bounded channel read by the engine task,
//! and blocks the driver thread until the engine acknowledges that the
//! event has been dispatched. Two events from one thread can therefore
//! never be absorbed out of order.
//!
//! A callback raised on a tokio runtime thread cannot wait for the engine,
//! which may be scheduled on that very thread. On a multi-thread runtime it
//! waits only for channel capacity, inside `block_in_place`. On a
//! current-thread runtime a full channel spills into an ordered backlog
//! that a spawned task drains. No event is ever dropped while the engine
//! is alive.

use std::collections::VecDeque;
use std::sync::Arc;

use opentrons_hardware::{HardwareEvent, HardwareEventSource, SubscriptionId};
use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Event on its way to the engine task.
#[derive(Debug)]
pub struct ForwardedEvent {
    pub event: HardwareEvent,
    /// Signalled once the event has been dispatched. `None` when the sender
    /// did not wait.
    pub absorbed: Option<oneshot::Sender<()>>,
}

impl ForwardedEvent {
    fn unacknowledged(event: HardwareEvent) -> Self {
        Self {
            event,
            absorbed: None,
        }
    }

    /// Release the waiting hardware thread, if any.
    pub fn acknowledge(self) {
        if let Some(absorbed) = self.absorbed {
            let _ = absorbed.send(());
        }
    }
}

/// Subscribes to a [`HardwareEventSource`] on behalf of the engine.
pub struct HardwareEventForwarder {
    source: Arc<dyn HardwareEventSource>,
    sender: mpsc::Sender<ForwardedEvent>,
    backlog: Arc<Mutex<Backlog>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

/// Events raised on a current-thread runtime while the channel was full.
#[derive(Debug, Default)]
struct Backlog {
    events: VecDeque<HardwareEvent>,
    draining: bool,
}

impl std::fmt::Debug for HardwareEventForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareEventForwarder")
            .field("subscription", &*self.subscription.lock())
            .finish()
    }
}

impl HardwareEventForwarder {
    pub fn new(source: Arc<dyn HardwareEventSource>, sender: mpsc::Sender<ForwardedEvent>) -> Self {
        Self {
            source,
            sender,
            backlog: Arc::new(Mutex::new(Backlog::default())),
            subscription: Mutex::new(None),
        }
    }

    /// Subscribe to the source. Further calls are no-ops while subscribed.
    pub fn start(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }
        let sender = self.sender.clone();
        let backlog = self.backlog.clone();
        let id = self
            .source
            .subscribe(Arc::new(move |event| forward(&sender, &backlog, event)));
        info!(subscription = ?id, "Hardware event forwarding started");
        *subscription = Some(id);
    }

    /// Unsubscribe. An event already inside the callback may still arrive
    /// after this returns.
    pub fn stop_soon(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.source.unsubscribe(id);
            info!(subscription = ?id, "Hardware event forwarding stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.subscription.lock().is_some()
    }
}

impl Drop for HardwareEventForwarder {
    fn drop(&mut self) {
        self.stop_soon();
    }
}

fn forward(sender: &mpsc::Sender<ForwardedEvent>, backlog: &Arc<Mutex<Backlog>>, event: HardwareEvent) {
    match Handle::try_current() {
        Err(_) => send_and_wait(sender, event),
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            send_or_spill(&handle, sender, backlog, event);
        }
        Ok(_) => tokio::task::block_in_place(|| {
            if sender
                .blocking_send(ForwardedEvent::unacknowledged(event))
                .is_err()
            {
                debug!("Engine is gone; hardware event discarded");
            }
        }),
    }
}

/// Send from a thread outside the runtime and wait until the engine has
/// dispatched the event.
fn send_and_wait(sender: &mpsc::Sender<ForwardedEvent>, event: HardwareEvent) {
    let (absorbed, done) = oneshot::channel();
    if sender
        .blocking_send(ForwardedEvent {
            event,
            absorbed: Some(absorbed),
        })
        .is_err()
    {
        debug!("Engine is gone; hardware event discarded");
        return;
    }
    // An Err means the engine dropped the event without dispatching it,
    // which only happens on shutdown.
    let _ = done.blocking_recv();
}

/// Send without blocking a current-thread runtime. Once anything is
/// backlogged, later events queue behind it so order is kept.
fn send_or_spill(
    handle: &Handle,
    sender: &mpsc::Sender<ForwardedEvent>,
    backlog: &Arc<Mutex<Backlog>>,
    event: HardwareEvent,
) {
    let mut pending = backlog.lock();
    if !pending.draining {
        match sender.try_send(ForwardedEvent::unacknowledged(event)) {
            Ok(()) => return,
            Err(TrySendError::Closed(_)) => {
                debug!("Engine is gone; hardware event discarded");
                return;
            }
            Err(TrySendError::Full(forwarded)) => {
                pending.events.push_back(forwarded.event);
            }
        }
        pending.draining = true;
        debug!("Event channel full; draining hardware events in the background");
        handle.spawn(drain_backlog(sender.clone(), backlog.clone()));
    } else {
        pending.events.push_back(event);
    }
}

async fn drain_backlog(sender: mpsc::Sender<ForwardedEvent>, backlog: Arc<Mutex<Backlog>>) {
    loop {
        let next = {
            let mut pending = backlog.lock();
            match pending.events.pop_front() {
                Some(event) => event,
                None => {
                    pending.draining = false;
                    return;
                }
            }
        };
        if sender
            .send(ForwardedEvent::unacknowledged(next))
            .await
            .is_err()
        {
            let mut pending = backlog.lock();
            debug!(discarded = pending.events.len() + 1, "Engine is gone; backlog discarded");
            pending.events.clear();
            pending.draining = false;
            return;
        }
    }
}
