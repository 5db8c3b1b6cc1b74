// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process simulated robot.
//!
//! [`SimulatedHardware`] implements the full device interface without any
//! physical I/O. Tests drive it by injecting faults, adding latency,
//! attaching modules and emitting hardware events from their own threads.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::control::{HardwareControl, MotionController};
use crate::error::{HardwareError, Result};
use crate::events::{
    CallbackRegistry, EventCallback, HardwareEvent, HardwareEventSource, SubscriptionId,
};
use crate::types::{
    AttachedModule, Axis, DoorState, HardwareOperation, ModuleModel, ModuleReading, ModuleStatus,
    Mount, Point, RobotGeneration,
};

const AMBIENT_TEMPERATURE: f64 = 23.0;

#[derive(Debug, Clone)]
struct SimulatedModule {
    model: ModuleModel,
    target: Option<f64>,
    current: f64,
    hold: Option<(Duration, Instant)>,
    shake_speed: Option<u32>,
    magnet_height: Option<f64>,
    readback_lag: Duration,
}

impl SimulatedModule {
    fn new(model: ModuleModel) -> Self {
        Self {
            model,
            target: None,
            current: AMBIENT_TEMPERATURE,
            hold: None,
            shake_speed: None,
            magnet_height: None,
            readback_lag: Duration::ZERO,
        }
    }

    fn reading(&self) -> ModuleReading {
        let status = match self.target {
            None => ModuleStatus::Idle,
            Some(target) if (self.current - target).abs() < 0.5 => ModuleStatus::Holding,
            Some(target) if self.current < target => ModuleStatus::Heating,
            Some(_) => ModuleStatus::Cooling,
        };
        let hold_time_remaining = self.hold.map(|(hold, started)| {
            let elapsed = Instant::now().saturating_duration_since(started) + self.readback_lag;
            hold.saturating_sub(elapsed).as_secs_f64()
        });
        ModuleReading {
            status,
            target_temperature: self.target,
            current_temperature: match self.model {
                ModuleModel::MagneticModuleV2 => None,
                _ => Some(self.current),
            },
            hold_time_remaining,
            shake_speed: self.shake_speed,
            magnet_height: self.magnet_height,
        }
    }
}

/// A simulated robot with fault injection.
pub struct SimulatedHardware {
    generation: RobotGeneration,
    door: Mutex<DoorState>,
    estop: AtomicBool,
    latency: Mutex<Duration>,
    faults: Mutex<HashMap<HardwareOperation, VecDeque<HardwareError>>>,
    journal: Mutex<Vec<HardwareOperation>>,
    modules: Mutex<BTreeMap<String, SimulatedModule>>,
    liquid_surface: Mutex<Option<f64>>,
    events: CallbackRegistry,
}

impl std::fmt::Debug for SimulatedHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedHardware")
            .field("generation", &self.generation)
            .field("door", &*self.door.lock())
            .field("modules", &self.modules.lock().len())
            .finish()
    }
}

impl SimulatedHardware {
    /// Create a simulator for the given robot generation.
    pub fn new(generation: RobotGeneration) -> Self {
        Self {
            generation,
            door: Mutex::new(DoorState::Closed),
            estop: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            faults: Mutex::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            modules: Mutex::new(BTreeMap::new()),
            liquid_surface: Mutex::new(Some(10.0)),
            events: CallbackRegistry::new(),
        }
    }

    /// Delay applied to every operation before it completes.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Make the next call to `operation` fail with `error`.
    ///
    /// Faults queue up per operation and are consumed in order.
    pub fn inject_fault(&self, operation: HardwareOperation, error: HardwareError) {
        self.faults
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Number of injected faults not yet consumed.
    pub fn pending_faults(&self) -> usize {
        self.faults.lock().values().map(VecDeque::len).sum()
    }

    /// Operations that completed successfully, in order.
    pub fn journal(&self) -> Vec<HardwareOperation> {
        self.journal.lock().clone()
    }

    /// Count of successful calls to `operation`.
    pub fn calls(&self, operation: HardwareOperation) -> usize {
        self.journal.lock().iter().filter(|op| **op == operation).count()
    }

    /// Attach a module to the simulated USB bus.
    pub fn attach_module(&self, serial: impl Into<String>, model: ModuleModel) {
        self.modules
            .lock()
            .insert(serial.into(), SimulatedModule::new(model));
    }

    /// Skew the module's hold-time read-back, as a slow poller would.
    pub fn set_module_readback_lag(&self, serial: &str, lag: Duration) {
        if let Some(module) = self.modules.lock().get_mut(serial) {
            module.readback_lag = lag;
        }
    }

    /// Surface height reported by the next probes; `None` means no liquid.
    pub fn set_liquid_surface(&self, height: Option<f64>) {
        *self.liquid_surface.lock() = height;
    }

    /// Current door state.
    pub fn door_state(&self) -> DoorState {
        *self.door.lock()
    }

    /// Raise a hardware event on the calling thread.
    ///
    /// Internal state (door, estop) is updated before subscribers run.
    pub fn emit(&self, event: HardwareEvent) {
        match &event {
            HardwareEvent::DoorStateChanged { state } => *self.door.lock() = *state,
            HardwareEvent::EstopEngaged => self.estop.store(true, Ordering::SeqCst),
            HardwareEvent::EstopReleased => self.estop.store(false, Ordering::SeqCst),
            HardwareEvent::ModuleStatus { .. } => {}
        }
        debug!(?event, "Simulated hardware event");
        self.events.publish(&event);
    }

    /// Start a background thread that publishes module readings.
    pub fn spawn_module_poller(self: &Arc<Self>, interval: Duration) -> ModulePoller {
        let stop = Arc::new(AtomicBool::new(false));
        let hardware = Arc::clone(self);
        let stop_flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("module-poller".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::SeqCst) {
                    let readings: Vec<(String, ModuleReading)> = hardware
                        .modules
                        .lock()
                        .iter()
                        .map(|(serial, module)| (serial.clone(), module.reading()))
                        .collect();
                    for (serial, reading) in readings {
                        hardware.emit(HardwareEvent::ModuleStatus { serial, reading });
                    }
                    std::thread::sleep(interval);
                }
            });
        match handle {
            Ok(handle) => ModulePoller {
                stop,
                handle: Some(handle),
            },
            Err(e) => {
                warn!(error = %e, "Failed to spawn module poller thread");
                ModulePoller { stop, handle: None }
            }
        }
    }

    async fn perform(&self, operation: HardwareOperation) -> Result<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.estop.load(Ordering::SeqCst) {
            return Err(HardwareError::EstopActivated);
        }
        let fault = self
            .faults
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        if let Some(fault) = fault {
            debug!(%operation, error = %fault, "Injected fault");
            return Err(fault);
        }
        self.journal.lock().push(operation);
        Ok(())
    }

    fn with_module<T>(
        &self,
        serial: &str,
        f: impl FnOnce(&mut SimulatedModule) -> T,
    ) -> Result<T> {
        let mut modules = self.modules.lock();
        let module = modules
            .get_mut(serial)
            .ok_or_else(|| HardwareError::ModuleNotFound {
                serial: serial.to_string(),
            })?;
        Ok(f(module))
    }

    fn check_interlock(&self) -> Result<()> {
        if self.generation.requires_door_interlock() && self.door_state() == DoorState::Open {
            return Err(HardwareError::DoorOpenDuringMotion);
        }
        Ok(())
    }
}

#[async_trait]
impl MotionController for SimulatedHardware {
    fn generation(&self) -> RobotGeneration {
        self.generation
    }

    async fn home(&self, axes: &[Axis]) -> Result<()> {
        self.check_interlock()?;
        self.perform(HardwareOperation::Home).await?;
        debug!(axes = axes.len(), "Homed");
        Ok(())
    }

    async fn move_to(&self, mount: Mount, target: Point, speed: Option<f64>) -> Result<()> {
        self.check_interlock()?;
        let speed = speed
            .unwrap_or(self.generation.max_speed())
            .min(self.generation.max_speed());
        self.perform(HardwareOperation::MoveTo).await?;
        debug!(%mount, x = target.x, y = target.y, z = target.z, speed, "Moved");
        Ok(())
    }

    async fn probe(&self, _mount: Mount, start: Point) -> Result<Option<f64>> {
        self.perform(HardwareOperation::Probe).await?;
        Ok(self.liquid_surface.lock().map(|h| h.min(start.z)))
    }
}

#[async_trait]
impl HardwareControl for SimulatedHardware {
    async fn pick_up_tip(&self, _mount: Mount, _tip_length: f64) -> Result<()> {
        self.perform(HardwareOperation::PickUpTip).await
    }

    async fn drop_tip(&self, _mount: Mount) -> Result<()> {
        self.perform(HardwareOperation::DropTip).await
    }

    async fn aspirate(&self, _mount: Mount, _volume: f64, _flow_rate: f64) -> Result<()> {
        self.perform(HardwareOperation::Aspirate).await
    }

    async fn dispense(&self, _mount: Mount, _volume: f64, _flow_rate: f64) -> Result<()> {
        self.perform(HardwareOperation::Dispense).await
    }

    async fn blow_out(&self, _mount: Mount) -> Result<()> {
        self.perform(HardwareOperation::BlowOut).await
    }

    async fn attached_modules(&self) -> Result<Vec<AttachedModule>> {
        Ok(self
            .modules
            .lock()
            .iter()
            .map(|(serial, module)| AttachedModule {
                serial: serial.clone(),
                model: module.model,
            })
            .collect())
    }

    async fn module_set_temperature(
        &self,
        serial: &str,
        celsius: f64,
        hold: Option<Duration>,
    ) -> Result<()> {
        self.with_module(serial, |_| ())?;
        self.perform(HardwareOperation::ModuleSetTemperature).await?;
        self.with_module(serial, |module| {
            module.target = Some(celsius);
            module.current = celsius;
            module.hold = hold.map(|h| (h, Instant::now()));
        })
    }

    async fn module_await_temperature(&self, serial: &str) -> Result<()> {
        self.with_module(serial, |_| ())?;
        self.perform(HardwareOperation::ModuleAwaitTemperature).await
    }

    async fn module_deactivate(&self, serial: &str) -> Result<()> {
        self.with_module(serial, |_| ())?;
        self.perform(HardwareOperation::ModuleDeactivate).await?;
        self.with_module(serial, |module| {
            module.target = None;
            module.current = AMBIENT_TEMPERATURE;
            module.hold = None;
            module.shake_speed = None;
            module.magnet_height = None;
        })
    }

    async fn module_status(&self, serial: &str) -> Result<ModuleReading> {
        self.with_module(serial, |_| ())?;
        self.perform(HardwareOperation::ModuleStatus).await?;
        self.with_module(serial, |module| module.reading())
    }

    async fn set_shake_speed(&self, serial: &str, rpm: u32) -> Result<()> {
        self.with_module(serial, |_| ())?;
        self.perform(HardwareOperation::SetShakeSpeed).await?;
        self.with_module(serial, |module| module.shake_speed = Some(rpm))
    }

    async fn engage_magnets(&self, serial: &str, height: f64) -> Result<()> {
        self.with_module(serial, |_| ())?;
        self.perform(HardwareOperation::EngageMagnets).await?;
        self.with_module(serial, |module| module.magnet_height = Some(height))
    }

    async fn halt(&self) -> Result<()> {
        // Halting works with the estop engaged, so it skips `perform`.
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.journal.lock().push(HardwareOperation::Halt);
        info!("Simulated hardware halted");
        Ok(())
    }
}

impl HardwareEventSource for SimulatedHardware {
    fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.events.unsubscribe(id)
    }
}

/// Handle to a running module poller thread. Stops the thread on drop.
#[derive(Debug)]
pub struct ModulePoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ModulePoller {
    /// Stop polling and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Module poller thread panicked");
        }
    }
}

impl Drop for ModulePoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_fault_is_consumed_once() {
        let hw = SimulatedHardware::new(RobotGeneration::Ot2);
        hw.inject_fault(
            HardwareOperation::PickUpTip,
            HardwareError::TipPickupFailed { mount: Mount::Left },
        );

        let first = hw.pick_up_tip(Mount::Left, 50.0).await;
        assert_eq!(
            first,
            Err(HardwareError::TipPickupFailed { mount: Mount::Left })
        );
        assert!(hw.pick_up_tip(Mount::Left, 50.0).await.is_ok());
        assert_eq!(hw.calls(HardwareOperation::PickUpTip), 1);
        assert_eq!(hw.pending_faults(), 0);
    }

    #[tokio::test]
    async fn test_flex_refuses_motion_with_door_open() {
        let hw = SimulatedHardware::new(RobotGeneration::Flex);
        hw.emit(HardwareEvent::DoorStateChanged {
            state: DoorState::Open,
        });

        let result = hw.move_to(Mount::Left, Point::default(), None).await;
        assert_eq!(result, Err(HardwareError::DoorOpenDuringMotion));

        let ot2 = SimulatedHardware::new(RobotGeneration::Ot2);
        ot2.emit(HardwareEvent::DoorStateChanged {
            state: DoorState::Open,
        });
        assert!(ot2.move_to(Mount::Left, Point::default(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_estop_fails_every_operation() {
        let hw = SimulatedHardware::new(RobotGeneration::Ot2);
        hw.emit(HardwareEvent::EstopEngaged);
        assert_eq!(
            hw.aspirate(Mount::Left, 10.0, 7.0).await,
            Err(HardwareError::EstopActivated)
        );
        hw.emit(HardwareEvent::EstopReleased);
        assert!(hw.aspirate(Mount::Left, 10.0, 7.0).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_module_hold_time_counts_down() {
        let hw = SimulatedHardware::new(RobotGeneration::Ot2);
        hw.attach_module("TC1", ModuleModel::ThermocyclerModuleV2);

        hw.module_set_temperature("TC1", 95.0, Some(Duration::from_secs(30)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        let reading = hw.module_status("TC1").await.unwrap();
        assert_eq!(reading.status, ModuleStatus::Holding);
        assert_eq!(reading.target_temperature, Some(95.0));
        assert_eq!(reading.hold_time_remaining, Some(25.0));
    }

    #[tokio::test]
    async fn test_unknown_module_serial() {
        let hw = SimulatedHardware::new(RobotGeneration::Ot2);
        let err = hw.module_deactivate("missing").await.unwrap_err();
        assert_eq!(err.error_code(), "MODULE_NOT_FOUND");
    }

    #[test]
    fn test_module_poller_publishes_readings() {
        let hw = Arc::new(SimulatedHardware::new(RobotGeneration::Ot2));
        hw.attach_module("TM1", ModuleModel::TemperatureModuleV2);

        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        hw.subscribe(Arc::new(move |event| {
            let _ = tx.lock().send(event);
        }));

        let poller = hw.spawn_module_poller(Duration::from_millis(5));
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        poller.stop();

        match event {
            HardwareEvent::ModuleStatus { serial, reading } => {
                assert_eq!(serial, "TM1");
                assert_eq!(reading.status, ModuleStatus::Idle);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
