// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run status transitions: play, pause, stop, door and estop.

mod common;

use std::time::Duration;

use common::*;
use opentrons_hardware::{DoorState, HardwareEvent, HardwareOperation};
use protocol_engine::{CommandStatus, EngineStatus, NotificationEvent, RunResult};
use serde_json::json;

fn wait_for_duration(seconds: f64) -> serde_json::Value {
    json!({"commandType": "waitForDuration", "params": {"seconds": seconds}})
}

#[tokio::test]
async fn test_idle_play_succeed() {
    let ctx = TestContext::new();
    let first = ctx.add(home()).await;
    let second = ctx.add(home()).await;
    assert_eq!(ctx.engine.state().status(), EngineStatus::Idle);

    ctx.engine.play().await.unwrap();
    ctx.engine.wait_until_settled().await.unwrap();
    assert_eq!(ctx.engine.state().status(), EngineStatus::Running);

    ctx.engine.finish(None).await.unwrap();
    let state = ctx.engine.wait_until_complete().await.unwrap();
    assert_eq!(state.status(), EngineStatus::Succeeded);
    assert_eq!(state.commands().get_run_result(), Some(RunResult::Succeeded));
    for id in [&first.id, &second.id] {
        assert_eq!(state.commands().get(id).unwrap().status, CommandStatus::Succeeded);
    }
    assert_eq!(ctx.hardware.calls(HardwareOperation::Home), 2);
    assert_eq!(ctx.hardware.calls(HardwareOperation::Halt), 1);

    // Nothing is accepted once the run is over.
    let err = ctx.engine.add_command_json(home()).await.unwrap_err();
    assert_eq!(err.error_code(), "RUN_STOPPED");
    let err = ctx.engine.stop().await.unwrap_err();
    assert_eq!(err.error_code(), "RUN_CONFLICT");
}

#[tokio::test]
async fn test_pause_only_allowed_while_running() {
    let ctx = TestContext::new();
    let err = ctx.engine.pause().await.unwrap_err();
    assert_eq!(err.error_code(), "PAUSE_NOT_ALLOWED");

    ctx.engine.play().await.unwrap();
    ctx.engine.pause().await.unwrap();
    assert_eq!(ctx.engine.state().status(), EngineStatus::Paused);

    // Paused queue does not start new commands.
    let command = ctx.add(home()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        ctx.engine.state().commands().get(&command.id).unwrap().status,
        CommandStatus::Queued
    );

    ctx.engine.play().await.unwrap();
    let command = ctx.engine.wait_for_command(&command.id).await.unwrap();
    assert_eq!(command.status, CommandStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_running_command_finish() {
    let ctx = TestContext::new();
    ctx.hardware.set_latency(Duration::from_millis(500));
    let first = ctx.add(home()).await;
    let second = ctx.add(home()).await;

    ctx.engine.play().await.unwrap();
    ctx.engine
        .wait_for(|state| state.commands().get_running_command_id() == Some(first.id.as_str()))
        .await
        .unwrap();
    ctx.engine.stop().await.unwrap();
    assert_eq!(ctx.engine.state().status(), EngineStatus::StopRequested);

    let state = ctx.engine.wait_until_complete().await.unwrap();
    assert_eq!(state.status(), EngineStatus::Stopped);
    // The home already under way completes; the next one never starts.
    assert_eq!(
        state.commands().get(&first.id).unwrap().status,
        CommandStatus::Succeeded
    );
    assert!(state.commands().get(&second.id).unwrap().started_at.is_none());
    assert_eq!(ctx.hardware.calls(HardwareOperation::Home), 1);
    assert_eq!(ctx.hardware.calls(HardwareOperation::Halt), 1);
}

#[tokio::test(start_paused = true)]
async fn test_door_open_blocks_run() {
    let ctx = TestContext::new();
    let wait = ctx.add(wait_for_duration(10.0)).await;
    let after = ctx.add(home()).await;
    ctx.engine.play().await.unwrap();
    ctx.engine
        .wait_for(|state| state.commands().get_running_command_id().is_some())
        .await
        .unwrap();

    ctx.hardware.emit(HardwareEvent::DoorStateChanged {
        state: DoorState::Open,
    });
    ctx.engine
        .wait_for(|state| state.status() == EngineStatus::BlockedByOpenDoor)
        .await
        .unwrap();

    // The command already running is not interrupted.
    let wait = ctx.engine.wait_for_command(&wait.id).await.unwrap();
    assert_eq!(wait.status, CommandStatus::Succeeded);
    assert_eq!(ctx.hardware.calls(HardwareOperation::Home), 0);

    let err = ctx.engine.play().await.unwrap_err();
    assert_eq!(err.error_code(), "ROBOT_DOOR_OPEN");

    ctx.hardware.emit(HardwareEvent::DoorStateChanged {
        state: DoorState::Closed,
    });
    let state = ctx
        .engine
        .wait_for(|state| state.commands().get_door_state() == DoorState::Closed)
        .await
        .unwrap();
    assert_eq!(state.status(), EngineStatus::Paused);

    ctx.engine.play().await.unwrap();
    ctx.engine.wait_for_command(&after.id).await.unwrap();
    assert_eq!(ctx.hardware.calls(HardwareOperation::Home), 1);
}

#[tokio::test(start_paused = true)]
async fn test_estop_fails_run() {
    let ctx = TestContext::new();
    let wait = ctx.add(wait_for_duration(3600.0)).await;
    ctx.engine.play().await.unwrap();
    ctx.engine
        .wait_for(|state| state.commands().get_running_command_id().is_some())
        .await
        .unwrap();

    ctx.hardware.emit(HardwareEvent::EstopEngaged);
    let state = ctx.engine.wait_until_complete().await.unwrap();
    assert_eq!(state.status(), EngineStatus::Failed);
    assert!(state.commands().get_stopped_by_estop());
    let wait = state.commands().get(&wait.id).unwrap();
    assert_eq!(wait.error.as_ref().unwrap().error_code, "RUN_STOPPED");

    let err = ctx.engine.play().await.unwrap_err();
    assert_eq!(err.error_code(), "RUN_STOPPED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_from_driver_thread_is_in_state_when_emit_returns() {
    let ctx = TestContext::new();
    let hardware = ctx.hardware.clone();

    // A plain thread, outside the runtime, like a hardware driver callback.
    let driver = std::thread::spawn(move || {
        hardware.emit(HardwareEvent::DoorStateChanged {
            state: DoorState::Open,
        })
    });
    tokio::task::spawn_blocking(move || driver.join().unwrap())
        .await
        .unwrap();

    assert_eq!(
        ctx.engine.state().commands().get_door_state(),
        DoorState::Open
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_are_absorbed_while_hardware_halts() {
    let ctx = TestContext::new();
    ctx.engine.play().await.unwrap();
    ctx.hardware.set_latency(Duration::from_secs(2));
    ctx.engine.stop().await.unwrap();

    // The driver thread blocks until its event is in state. That must not
    // wait for the slow halt to finish.
    let hardware = ctx.hardware.clone();
    let driver = std::thread::spawn(move || {
        hardware.emit(HardwareEvent::DoorStateChanged {
            state: DoorState::Open,
        })
    });
    tokio::task::spawn_blocking(move || driver.join().unwrap())
        .await
        .unwrap();

    let state = ctx.engine.state();
    assert_eq!(state.commands().get_door_state(), DoorState::Open);
    assert_eq!(state.status(), EngineStatus::StopRequested);
    assert_eq!(ctx.hardware.calls(HardwareOperation::Halt), 0);

    let state = ctx.engine.wait_until_complete().await.unwrap();
    assert_eq!(state.status(), EngineStatus::Stopped);
    assert_eq!(ctx.hardware.calls(HardwareOperation::Halt), 1);
}

#[tokio::test]
async fn test_notifications_follow_command_lifecycle() {
    let ctx = TestContext::new();
    let mut notifications = ctx.engine.subscribe();
    let command = ctx.add(home()).await;
    ctx.engine.play().await.unwrap();
    ctx.engine.wait_for_command(&command.id).await.unwrap();

    let mut events = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        events.push(notification.event);
    }
    let running = events
        .iter()
        .position(|e| *e == NotificationEvent::CommandRunning)
        .expect("no command-running notification");
    let complete = events
        .iter()
        .position(|e| *e == NotificationEvent::CommandComplete)
        .expect("no command-complete notification");
    assert!(running < complete);
    assert!(events.contains(&NotificationEvent::RunStatus));
}
