// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protocol engine: the task that owns a run.
//!
//! [`ProtocolEngine::builder`] spawns a single tokio task that holds the
//! [`ActionDispatcher`] and therefore the only writable copy of run state.
//! Everything else talks to it by message:
//!
//! ```text
//!   ProtocolEngine (clone per caller) ──requests──┐
//!                                                 ▼
//!   hardware thread ──► forwarder ──events──► engine task ──► dispatcher ──► State
//!                                                 ▲   │                      │
//!                     command handler future ─────┘   └── notifications ◄────┘
//! ```
//!
//! The task runs one `biased` select loop. Hardware events win over client
//! requests, which win over the running command, so a door opening is in
//! state before the next command can observe it. At most one command runs
//! at a time; its handler future is polled by the loop itself, so state is
//! never mutated outside the task.
//!
//! Stop cancels a token the handlers check between hardware steps. A
//! hardware call already under way finishes first; once nothing is running
//! the task halts the hardware and marks the run complete. The halt is
//! polled by the same loop, so events and requests keep flowing meanwhile.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use opentrons_hardware::{HardwareControl, HardwareError, HardwareEvent, HardwareEventSource};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::actions::{Action, ActionLogEntry, ErrorRecoveryType, HardwareEventAction, Liquid};
use crate::commands::handlers::{self, CommandContext, HandlerResult, RunControl};
use crate::commands::{Command, CommandCreate, CommandIntent, CommandParams};
use crate::config::EngineConfig;
use crate::definitions::LabwareDefinition;
use crate::dispatcher::{ActionDispatcher, Notification};
use crate::error::{EngineError, ErrorOccurrence, Result};
use crate::forwarder::{ForwardedEvent, HardwareEventForwarder};
use crate::history::{self, HistoryTap, RunHistory};
use crate::recovery::{
    Disposition, ErrorRecoveryPolicy, FaultClass, StandardRecoveryPolicy, classify,
};
use crate::state::{EngineStatus, State};

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

enum Request {
    /// Validate and dispatch a client action.
    Dispatch {
        action: Action,
        reply: oneshot::Sender<Result<Arc<State>>>,
    },
    ActionLog {
        reply: oneshot::Sender<Vec<ActionLogEntry>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Builder for a [`ProtocolEngine`].
pub struct ProtocolEngineBuilder {
    config: EngineConfig,
    hardware: Arc<dyn HardwareControl>,
    event_source: Option<Arc<dyn HardwareEventSource>>,
    history: Option<Arc<dyn RunHistory>>,
    recovery_policy: Option<Arc<dyn ErrorRecoveryPolicy>>,
    run_id: Option<String>,
}

impl std::fmt::Debug for ProtocolEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngineBuilder")
            .field("config", &self.config)
            .field("event_source", &self.event_source.as_ref().map(|_| "..."))
            .field("history", &self.history.as_ref().map(|_| "..."))
            .field("recovery_policy", &self.recovery_policy.as_ref().map(|_| "..."))
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl ProtocolEngineBuilder {
    fn new(config: EngineConfig, hardware: Arc<dyn HardwareControl>) -> Self {
        Self {
            config,
            hardware,
            event_source: None,
            history: None,
            recovery_policy: None,
            run_id: None,
        }
    }

    /// Forward door, estop and module events from `source`.
    pub fn event_source(mut self, source: Arc<dyn HardwareEventSource>) -> Self {
        self.event_source = Some(source);
        self
    }

    /// Persist the action log.
    pub fn history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Replace the policy built from the config's retry and recovery settings.
    pub fn recovery_policy(mut self, policy: Arc<dyn ErrorRecoveryPolicy>) -> Self {
        self.recovery_policy = Some(policy);
        self
    }

    /// Run id used for history and logs. Default: a random UUID.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Spawn the engine task on the current tokio runtime.
    pub fn spawn(self) -> ProtocolEngine {
        let config = Arc::new(self.config);
        let run_id = self.run_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (mut dispatcher, snapshots) =
            ActionDispatcher::new(State::new(config.state_config()), notifications.clone());

        let writer = self.history.map(|history| {
            let (tap, entries) = mpsc::unbounded_channel();
            dispatcher.add_handler(Box::new(HistoryTap::new(tap)));
            history::spawn_writer(history, run_id.clone(), entries)
        });

        let (requests_tx, requests) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (events_tx, events) = mpsc::channel(config.event_channel_capacity);
        let forwarder = self.event_source.map(|source| {
            let forwarder = HardwareEventForwarder::new(source, events_tx.clone());
            forwarder.start();
            forwarder
        });
        drop(events_tx);

        let policy = self.recovery_policy.unwrap_or_else(|| {
            Arc::new(StandardRecoveryPolicy::new(
                config.retry.clone(),
                config.error_recovery_enabled,
            ))
        });
        let run_control = Arc::new(EngineRunControl {
            requests: requests_tx.downgrade(),
            snapshots: snapshots.clone(),
        });

        let task = EngineTask {
            config,
            hardware: self.hardware,
            policy,
            run_control,
            dispatcher,
            requests,
            events,
            forwarder,
            writer,
            cancel: CancellationToken::new(),
            running: None,
            halting: None,
        };
        tokio::spawn(
            task.run()
                .instrument(info_span!("protocol_engine", run_id = %run_id)),
        );
        info!(%run_id, "Protocol engine started");

        ProtocolEngine {
            run_id: run_id.into(),
            requests: requests_tx,
            snapshots,
            notifications,
        }
    }
}

/// Handle to a running engine. Cheap to clone.
///
/// The engine task exits when [`shutdown`](Self::shutdown) is called or
/// every handle has been dropped.
#[derive(Clone)]
pub struct ProtocolEngine {
    run_id: Arc<str>,
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<Arc<State>>,
    notifications: broadcast::Sender<Notification>,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("run_id", &self.run_id)
            .field("status", &self.snapshots.borrow().status())
            .finish()
    }
}

impl ProtocolEngine {
    /// Start configuring an engine.
    pub fn builder(config: EngineConfig, hardware: Arc<dyn HardwareControl>) -> ProtocolEngineBuilder {
        ProtocolEngineBuilder::new(config, hardware)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Latest state snapshot.
    pub fn state(&self) -> Arc<State> {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to change notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Queue a command at the tail of its intent's lane.
    #[instrument(skip(self, request), fields(run_id = %self.run_id, command_type = %request.command_type()))]
    pub async fn add_command(&self, request: CommandCreate) -> Result<Command> {
        self.queue_command(request, false).await
    }

    /// Parse a JSON command request and queue it. Unknown command types
    /// fail with [`EngineError::Dispatch`] without reaching the queue.
    pub async fn add_command_json(&self, value: serde_json::Value) -> Result<Command> {
        let request = CommandCreate::from_value(value)?;
        self.add_command(request).await
    }

    /// Queue a command ahead of everything not yet started.
    #[instrument(skip(self, request), fields(run_id = %self.run_id, command_type = %request.command_type()))]
    pub async fn insert_now(&self, request: CommandCreate) -> Result<Command> {
        self.queue_command(request, true).await
    }

    async fn queue_command(&self, request: CommandCreate, priority: bool) -> Result<Command> {
        let command_id = Uuid::new_v4().to_string();
        let state = self
            .dispatch(Action::QueueCommand {
                command_id: command_id.clone(),
                request,
                created_at: Utc::now(),
                priority,
            })
            .await?;
        debug!(%command_id, priority, "Command queued");
        Ok(state.commands().get(&command_id)?.clone())
    }

    /// Start or resume executing protocol commands.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn play(&self) -> Result<()> {
        self.dispatch(Action::Play {
            requested_at: Utc::now(),
        })
        .await
        .map(drop)
    }

    /// Pause after the running command. Does not interrupt it.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn pause(&self) -> Result<()> {
        self.dispatch(Action::Pause).await.map(drop)
    }

    /// Stop the run. The running command may finish; nothing else starts.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn stop(&self) -> Result<()> {
        self.dispatch(Action::Stop { from_estop: false })
            .await
            .map(drop)
    }

    /// Leave error recovery and continue the protocol.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn resume_from_recovery(&self) -> Result<()> {
        self.dispatch(Action::ResumeFromRecovery).await.map(drop)
    }

    /// Queue a fixit copy of the command that put the run into recovery.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn retry_failed_command(&self) -> Result<Command> {
        let params: CommandParams = {
            let state = self.state();
            let failed = state
                .commands()
                .get_recovery_target_command()
                .ok_or_else(|| EngineError::RunConflict {
                    reason: "no failed command is awaiting recovery".to_string(),
                })?;
            failed.params.clone()
        };
        self.queue_command(
            CommandCreate::new(params).with_intent(CommandIntent::Fixit),
            true,
        )
        .await
    }

    /// Declare the run complete, failed if `error` is given.
    #[instrument(skip(self, error), fields(run_id = %self.run_id))]
    pub async fn finish(&self, error: Option<EngineError>) -> Result<()> {
        let error = error.map(|e| {
            ErrorOccurrence::from_error(Uuid::new_v4().to_string(), Utc::now(), &e, false)
        });
        self.dispatch(Action::Finish { error }).await.map(drop)
    }

    /// Make a custom labware definition loadable. Returns its URI.
    pub async fn add_labware_definition(&self, definition: LabwareDefinition) -> Result<String> {
        let uri = definition.uri();
        self.dispatch(Action::AddLabwareDefinition {
            definition: Box::new(definition),
        })
        .await?;
        Ok(uri)
    }

    /// Define a liquid for `loadLiquid`.
    pub async fn add_liquid(&self, liquid: Liquid) -> Result<()> {
        self.dispatch(Action::AddLiquid { liquid }).await.map(drop)
    }

    /// Copy of the action log so far.
    pub async fn action_log(&self) -> Result<Vec<ActionLogEntry>> {
        self.request(|reply| Request::ActionLog { reply }).await
    }

    /// Wait for the first snapshot matching `predicate`, current one included.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&State) -> bool) -> Result<Arc<State>> {
        let mut snapshots = self.snapshots.clone();
        let state = snapshots
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| EngineError::EngineClosed)?;
        Ok(Arc::clone(&state))
    }

    /// Wait for a command to succeed or fail.
    pub async fn wait_for_command(&self, command_id: &str) -> Result<Command> {
        let state = self
            .wait_for(|state| {
                state
                    .commands()
                    .get(command_id)
                    .map_or(true, |command| command.status.is_final())
            })
            .await?;
        Ok(state.commands().get(command_id)?.clone())
    }

    /// Wait until nothing is running and nothing can start.
    pub async fn wait_until_settled(&self) -> Result<Arc<State>> {
        self.wait_for(|state| state.commands().get_is_settled())
            .await
    }

    /// Wait until the run has ended and the hardware has been halted.
    pub async fn wait_until_complete(&self) -> Result<Arc<State>> {
        self.wait_for(|state| state.status().is_terminal()).await
    }

    /// Stop the engine task and flush run history.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Request::Shutdown { reply }).await
    }

    async fn dispatch(&self, action: Action) -> Result<Arc<State>> {
        self.request(|reply| Request::Dispatch { action, reply })
            .await?
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| EngineError::EngineClosed)?;
        response.await.map_err(|_| EngineError::EngineClosed)
    }
}

/// [`RunControl`] backed by the engine's own request channel.
///
/// Holds a weak sender so a handler cannot keep the engine alive.
struct EngineRunControl {
    requests: mpsc::WeakSender<Request>,
    snapshots: watch::Receiver<Arc<State>>,
}

#[async_trait::async_trait]
impl RunControl for EngineRunControl {
    async fn pause_and_wait(&self, cancel: &CancellationToken) -> Result<()> {
        let requests = self.requests.upgrade().ok_or(EngineError::EngineClosed)?;
        let (reply, response) = oneshot::channel();
        requests
            .send(Request::Dispatch {
                action: Action::Pause,
                reply,
            })
            .await
            .map_err(|_| EngineError::EngineClosed)?;
        drop(requests);
        match response.await {
            // Already paused, e.g. by the door.
            Ok(Ok(_)) | Ok(Err(EngineError::PauseNotAllowed { .. })) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(EngineError::EngineClosed),
        }

        let mut snapshots = self.snapshots.clone();
        loop {
            let paused = matches!(
                snapshots.borrow_and_update().status(),
                EngineStatus::Paused | EngineStatus::BlockedByOpenDoor
            );
            if !paused {
                break;
            }
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return Err(EngineError::EngineClosed);
                    }
                }
                _ = cancel.cancelled() => return Err(EngineError::RunStopped),
            }
        }
        if cancel.is_cancelled() {
            return Err(EngineError::RunStopped);
        }
        Ok(())
    }
}

struct RunningCommand {
    command_id: String,
    params: CommandParams,
    intent: CommandIntent,
    /// Automatic retries made so far.
    retries: u32,
    future: BoxFuture<'static, HandlerResult>,
}

struct EngineTask {
    config: Arc<EngineConfig>,
    hardware: Arc<dyn HardwareControl>,
    policy: Arc<dyn ErrorRecoveryPolicy>,
    run_control: Arc<dyn RunControl>,
    dispatcher: ActionDispatcher,
    requests: mpsc::Receiver<Request>,
    events: mpsc::Receiver<ForwardedEvent>,
    forwarder: Option<HardwareEventForwarder>,
    writer: Option<JoinHandle<()>>,
    /// Cancelled on stop and estop.
    cancel: CancellationToken,
    running: Option<RunningCommand>,
    /// Hardware halt in flight once the run has ended.
    halting: Option<BoxFuture<'static, std::result::Result<(), HardwareError>>>,
}

impl EngineTask {
    async fn run(mut self) {
        let mut shutdown_reply = None;

        loop {
            self.start_next_command();
            self.halt_if_run_ended();

            tokio::select! {
                biased;

                Some(forwarded) = self.events.recv() => self.absorb_event(forwarded),

                request = self.requests.recv() => match request {
                    Some(Request::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    Some(request) => self.handle_request(request),
                    None => {
                        debug!("All engine handles dropped");
                        break;
                    }
                },

                result = next_result(&mut self.running), if self.running.is_some() => {
                    self.complete_command(result);
                }

                halted = next_halt(&mut self.halting), if self.halting.is_some() => {
                    self.complete_halt(halted);
                }
            }
        }

        if let Some(running) = self.running.take() {
            warn!(command_id = %running.command_id, "Engine shut down while a command was running");
        }
        if self.halting.take().is_some() {
            warn!("Engine shut down before the hardware halt finished");
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.stop_soon();
        }
        let writer = self.writer.take();
        let actions = self.dispatcher.log().len();
        // Dropping the dispatcher closes the history tap.
        drop(self);
        if let Some(writer) = writer
            && let Err(e) = writer.await
        {
            error!(error = %e, "History writer task failed");
        }
        info!(actions, "Protocol engine stopped");

        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Dispatch { action, reply } => {
                let _ = reply.send(self.dispatch_checked(action));
            }
            Request::ActionLog { reply } => {
                let _ = reply.send(self.dispatcher.log().entries().to_vec());
            }
            // Handled by the run loop.
            Request::Shutdown { .. } => {}
        }
    }

    fn dispatch_checked(&mut self, action: Action) -> Result<Arc<State>> {
        if let Err(e) = self
            .dispatcher
            .state()
            .commands()
            .validate_action_allowed(&action)
        {
            debug!(action = action.name(), error = %e, error_code = e.error_code(), "Request rejected");
            return Err(e);
        }
        let stopping = matches!(action, Action::Stop { .. });
        let state = self.dispatcher.dispatch(action);
        if stopping {
            info!("Stop requested");
            self.cancel.cancel();
        }
        Ok(state)
    }

    fn absorb_event(&mut self, forwarded: ForwardedEvent) {
        match &forwarded.event {
            HardwareEvent::DoorStateChanged { state } => {
                info!(door = ?state, "Door state changed");
                self.dispatcher
                    .dispatch(Action::Hardware(HardwareEventAction::DoorChange {
                        door_state: *state,
                    }));
            }
            HardwareEvent::EstopEngaged => {
                error!("Emergency stop engaged");
                self.dispatcher
                    .dispatch(Action::Hardware(HardwareEventAction::EstopEngaged {
                        at: Utc::now(),
                    }));
                let stop = Action::Stop { from_estop: true };
                if self
                    .dispatcher
                    .state()
                    .commands()
                    .validate_action_allowed(&stop)
                    .is_ok()
                {
                    self.dispatcher.dispatch(stop);
                }
                self.cancel.cancel();
            }
            HardwareEvent::EstopReleased => {
                info!("Emergency stop released");
                self.dispatcher
                    .dispatch(Action::Hardware(HardwareEventAction::EstopReleased));
            }
            HardwareEvent::ModuleStatus { serial, reading } => {
                self.dispatcher
                    .dispatch(Action::Hardware(HardwareEventAction::ModuleStatus {
                        serial: serial.clone(),
                        reading: reading.clone(),
                    }));
            }
        }
        forwarded.acknowledge();
    }

    fn start_next_command(&mut self) {
        if self.running.is_some() {
            return;
        }
        let command = {
            let commands = self.dispatcher.state().commands();
            match commands.get_next_to_execute() {
                Ok(Some(command_id)) => match commands.get(command_id) {
                    Ok(command) => command.clone(),
                    Err(e) => {
                        error!(%command_id, error = %e, "Queued command has no record");
                        return;
                    }
                },
                Ok(None) | Err(_) => return,
            }
        };

        let state = self.dispatcher.dispatch(Action::RunCommand {
            command_id: command.id.clone(),
            started_at: Utc::now(),
        });
        info!(
            command_id = %command.id,
            command_type = %command.command_type(),
            intent = ?command.intent,
            "Running command"
        );
        let future = self.execute(&command.id, command.params.clone(), state, None);
        self.running = Some(RunningCommand {
            command_id: command.id,
            params: command.params,
            intent: command.intent,
            retries: 0,
            future,
        });
    }

    fn execute(
        &self,
        command_id: &str,
        params: CommandParams,
        state: Arc<State>,
        delay: Option<Duration>,
    ) -> BoxFuture<'static, HandlerResult> {
        let ctx = CommandContext {
            state,
            hardware: self.hardware.clone(),
            cancel: self.cancel.clone(),
            config: self.config.clone(),
            run_control: self.run_control.clone(),
        };
        let span = info_span!(
            "command",
            command_id = %command_id,
            command_type = %params.command_type()
        );
        async move {
            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancel.cancelled() => return Err(EngineError::RunStopped.into()),
                }
            }
            handlers::execute(params, ctx).await
        }
        .instrument(span)
        .boxed()
    }

    fn complete_command(&mut self, result: HandlerResult) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        let now = Utc::now();

        let failure = match result {
            Ok(outcome) => {
                info!(command_id = %running.command_id, "Command succeeded");
                self.dispatcher.dispatch(Action::SucceedCommand {
                    command_id: running.command_id,
                    result: outcome.result,
                    state_update: outcome.state_update,
                    completed_at: now,
                });
                return;
            }
            Err(failure) => failure,
        };

        let run_ended = self.dispatcher.state().commands().get_run_result().is_some();
        let disposition = if run_ended {
            Disposition::FailRun
        } else {
            self.policy
                .decide(&failure.error, running.intent, running.retries)
        };

        if let Disposition::Retry { delay } = disposition {
            running.retries += 1;
            warn!(
                command_id = %running.command_id,
                error = %failure.error,
                error_code = failure.error.error_code(),
                attempt = running.retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying command"
            );
            running.future = self.execute(
                &running.command_id,
                running.params.clone(),
                self.dispatcher.state().clone(),
                Some(delay),
            );
            self.running = Some(running);
            return;
        }

        let recovery_type = disposition
            .recovery_type()
            .unwrap_or(ErrorRecoveryType::FailRun);
        if recovery_type == ErrorRecoveryType::FailRun && !run_ended {
            error!(
                command_id = %running.command_id,
                error = %failure.error,
                error_code = failure.error.error_code(),
                "Command failed; failing run"
            );
        } else {
            warn!(
                command_id = %running.command_id,
                error = %failure.error,
                error_code = failure.error.error_code(),
                ?recovery_type,
                "Command failed"
            );
        }

        let is_defined = classify(&failure.error) != FaultClass::Fatal;
        self.dispatcher.dispatch(Action::FailCommand {
            command_id: running.command_id,
            error: ErrorOccurrence::from_error(
                Uuid::new_v4().to_string(),
                now,
                &failure.error,
                is_defined,
            ),
            recovery_type,
            state_update: failure.state_update,
            failed_at: now,
        });
    }

    /// Once the run has a result and nothing is running, start halting the
    /// hardware.
    fn halt_if_run_ended(&mut self) {
        let commands = self.dispatcher.state().commands();
        let ended = self.running.is_none()
            && self.halting.is_none()
            && commands.get_run_result().is_some()
            && commands.get_run_completed_at().is_none();
        if !ended {
            return;
        }

        debug!("Halting hardware");
        let hardware = self.hardware.clone();
        self.halting = Some(async move { hardware.halt().await }.boxed());
    }

    /// Mark the run complete once the halt has resolved.
    fn complete_halt(&mut self, halted: std::result::Result<(), HardwareError>) {
        self.halting = None;
        if let Err(e) = halted {
            warn!(error = %e, error_code = e.error_code(), "Failed to halt hardware");
        }
        let state = self.dispatcher.dispatch(Action::HardwareStopped {
            completed_at: Utc::now(),
        });
        self.cancel.cancel();
        info!(status = %state.status(), "Run complete");
    }
}

async fn next_result(running: &mut Option<RunningCommand>) -> HandlerResult {
    match running {
        Some(running) => (&mut running.future).await,
        None => std::future::pending().await,
    }
}

async fn next_halt(
    halting: &mut Option<BoxFuture<'static, std::result::Result<(), HardwareError>>>,
) -> std::result::Result<(), HardwareError> {
    match halting {
        Some(halt) => halt.await,
        None => std::future::pending().await,
    }
}
