// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command queue.
//!
//! Three FIFO lanes of command ids:
//!
//! | Lane     | Filled by                         | Drained when                  |
//! |----------|-----------------------------------|-------------------------------|
//! | priority | `insert_now`, fixit commands      | running or awaiting recovery  |
//! | setup    | setup-intent commands             | not paused, not in recovery   |
//! | protocol | protocol-intent commands          | running                       |
//!
//! The priority lane is the only way to jump ahead of the protocol FIFO.
//! The queue holds ids only; command records live in the command state.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::commands::CommandIntent;

/// Run phase as seen by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStatus {
    /// Before the first play; only setup commands run.
    #[default]
    Setup,
    /// Executing protocol commands.
    Running,
    /// Paused by request or by the door.
    Paused,
    /// Halted on a recoverable fault; only priority commands run.
    AwaitingRecovery,
    /// Awaiting recovery and paused by the door.
    AwaitingRecoveryPaused,
}

/// Ordered lanes of not-yet-started command ids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandQueue {
    priority: VecDeque<String>,
    setup: VecDeque<String>,
    protocol: VecDeque<String>,
}

impl CommandQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail of the lane for `intent`.
    pub fn enqueue(&mut self, command_id: String, intent: CommandIntent) {
        match intent {
            CommandIntent::Protocol => self.protocol.push_back(command_id),
            CommandIntent::Setup => self.setup.push_back(command_id),
            CommandIntent::Fixit => self.priority.push_back(command_id),
        }
    }

    /// Append to the priority lane, ahead of every setup and protocol command.
    pub fn insert_now(&mut self, command_id: String) {
        self.priority.push_back(command_id);
    }

    /// Next command to execute in `status`, if any.
    pub fn get_next(&self, status: QueueStatus) -> Option<&str> {
        match status {
            QueueStatus::AwaitingRecovery => self.priority.front(),
            QueueStatus::Running => self
                .priority
                .front()
                .or_else(|| self.setup.front())
                .or_else(|| self.protocol.front()),
            QueueStatus::Setup => self.setup.front(),
            QueueStatus::Paused | QueueStatus::AwaitingRecoveryPaused => None,
        }
        .map(String::as_str)
    }

    /// Remove an id from whichever lane holds it.
    pub fn remove(&mut self, command_id: &str) -> bool {
        for lane in [&mut self.priority, &mut self.setup, &mut self.protocol] {
            if let Some(index) = lane.iter().position(|id| id == command_id) {
                lane.remove(index);
                return true;
            }
        }
        false
    }

    /// Remove and return every queued id, priority first.
    pub fn drain(&mut self) -> Vec<String> {
        self.priority
            .drain(..)
            .chain(self.setup.drain(..))
            .chain(self.protocol.drain(..))
            .collect()
    }

    /// Whether a priority command is waiting.
    pub fn has_priority(&self) -> bool {
        !self.priority.is_empty()
    }

    /// Queued ids in execution order for a running queue.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.priority
            .iter()
            .chain(self.setup.iter())
            .chain(self.protocol.iter())
            .map(String::as_str)
    }

    /// Total queued.
    pub fn len(&self) -> usize {
        self.priority.len() + self.setup.len() + self.protocol.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_abc() -> CommandQueue {
        let mut queue = CommandQueue::new();
        for id in ["A", "B", "C"] {
            queue.enqueue(id.to_string(), CommandIntent::Protocol);
        }
        queue
    }

    fn execution_order(mut queue: CommandQueue) -> Vec<String> {
        let mut order = Vec::new();
        while let Some(next) = queue.get_next(QueueStatus::Running).map(str::to_string) {
            queue.remove(&next);
            order.push(next);
        }
        order
    }

    #[test]
    fn test_insert_now_runs_before_queued_commands() {
        let mut queue = queue_abc();
        queue.insert_now("RECOVERY".to_string());
        assert_eq!(execution_order(queue), ["RECOVERY", "A", "B", "C"]);
    }

    #[test]
    fn test_insert_now_preserves_order_among_priority_commands() {
        let mut queue = queue_abc();
        queue.insert_now("drop".to_string());
        queue.insert_now("pick".to_string());
        assert_eq!(execution_order(queue), ["drop", "pick", "A", "B", "C"]);
    }

    #[test]
    fn test_lanes_visible_per_status() {
        let mut queue = queue_abc();
        queue.enqueue("S".to_string(), CommandIntent::Setup);
        queue.enqueue("F".to_string(), CommandIntent::Fixit);

        assert_eq!(queue.get_next(QueueStatus::Setup), Some("S"));
        assert_eq!(queue.get_next(QueueStatus::AwaitingRecovery), Some("F"));
        assert_eq!(queue.get_next(QueueStatus::Running), Some("F"));
        assert_eq!(queue.get_next(QueueStatus::Paused), None);
        assert_eq!(queue.get_next(QueueStatus::AwaitingRecoveryPaused), None);
    }

    #[test]
    fn test_awaiting_recovery_ignores_protocol_lane() {
        let queue = queue_abc();
        assert_eq!(queue.get_next(QueueStatus::AwaitingRecovery), None);
    }

    #[test]
    fn test_drain_empties_every_lane() {
        let mut queue = queue_abc();
        queue.insert_now("R".to_string());
        assert_eq!(queue.drain(), ["R", "A", "B", "C"]);
        assert!(queue.is_empty());
    }
}
