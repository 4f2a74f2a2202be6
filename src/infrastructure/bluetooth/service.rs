//! Brick Service Module
//!
//! Public facade over one EV3 brick. Coordinates scanning and the
//! connection lifecycle, owns the per-connection task scope and exposes
//! motor, sensor and device operations.

use crate::domain::models::{
    led_pattern, CalibrationOutcome, ColorSensorMode, ConnectionStatus, DeviceKind, LedColor,
    LedStatus, ScannedDevice, SensorCategory, TransportEvent,
};
use crate::domain::motor::Motor;
use crate::domain::registry::{port_letter, DeviceRegistry};
use crate::domain::settings::Settings;
use crate::error::BrickError;
use crate::infrastructure::bluetooth::link::Link;
use crate::infrastructure::bluetooth::protocol::{self, encode, CommandType};
use crate::infrastructure::bluetooth::transport::Transport;
use crate::infrastructure::bluetooth::{calibrator, poller};
use crate::infrastructure::tasks::{CancelToken, TaskScope};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Connection lifecycle bookkeeping
#[derive(Default)]
struct Session {
    status: ConnectionStatus,
    /// Forwards scan results to the caller of `scan()`
    found: Option<mpsc::UnboundedSender<ScannedDevice>>,
    /// Drains transport events while a scan session is active
    pump: Option<JoinHandle<()>>,
    /// Present while connected; dropping it cancels every background task
    scope: Option<TaskScope>,
}

/// Controller for one EV3 brick
///
/// Cheap to clone; clones share the same connection and device state.
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct BrickService {
    link: Arc<Link>,
    session: Arc<Mutex<Session>>,
}

impl BrickService {
    pub fn new(transport: Arc<dyn Transport>, settings: Settings) -> Self {
        Self {
            link: Arc::new(Link::new(transport, settings)),
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    pub fn settings(&self) -> &Settings {
        self.link.settings()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_token(&self) -> Option<CancelToken> {
        self.session().scope.as_ref().map(TaskScope::token)
    }

    /// Spawn into the current connection scope; dropped when not connected
    fn spawn_in_session<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(scope) = self.session().scope.as_ref() {
            scope.spawn(future);
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Start discovering bricks, ending any previous session first
    ///
    /// Found devices are delivered on the returned channel until the next
    /// `scan()` or `disconnect()`.
    pub fn scan(&self) -> Result<mpsc::UnboundedReceiver<ScannedDevice>, BrickError> {
        self.end_session();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (found_tx, found_rx) = mpsc::unbounded_channel();

        let service = self.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                service.handle_event(event);
            }
        });

        {
            let mut session = self.session();
            session.found = Some(found_tx);
            session.pump = Some(pump);
        }

        let filter = self.link.settings().device_filter;
        info!(
            "Scanning for bricks (major class {}, minor class {})",
            filter.major_device_class, filter.minor_device_class
        );
        if let Err(e) = self.link.transport().scan(&filter, event_tx) {
            self.end_session();
            return Err(BrickError::Transport(e));
        }

        Ok(found_rx)
    }

    /// Connect to a brick reported by the current scan
    pub fn connect_to(&self, id: &str) -> Result<(), BrickError> {
        {
            let mut session = self.session();
            if session.pump.is_none() {
                return Err(BrickError::NotScanning);
            }
            session.status = ConnectionStatus::Connecting;
        }

        info!("Connecting to brick {}", id);
        if let Err(e) = self.link.transport().connect_peripheral(id) {
            self.session().status = ConnectionStatus::Disconnected;
            return Err(BrickError::Transport(e));
        }
        Ok(())
    }

    pub fn disconnect(&self) {
        info!("Disconnecting from brick");
        self.end_session();
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.session().status
    }

    /// Handle one transport event
    ///
    /// Events are normally drained from the channel handed to the transport
    /// by `scan()`; hosts that deliver events themselves may call this
    /// directly.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::DeviceFound(device) => {
                debug!("Found brick {} ({}) rssi {}", device.name, device.id, device.rssi);
                if let Some(found) = self.session().found.as_ref() {
                    let _ = found.send(device);
                }
            }
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::Message(bytes) => self.link.handle_message(&bytes),
        }
    }

    fn on_connected(&self) {
        info!("Connected to brick");
        self.link.reset_session();

        let scope = TaskScope::new();
        scope.spawn(poller::run(self.link.clone(), scope.token()));

        let mut session = self.session();
        session.status = ConnectionStatus::Connected;
        // Replacing a stale scope cancels its tasks
        session.scope = Some(scope);
    }

    fn on_disconnected(&self) {
        let scope = {
            let mut session = self.session();
            session.status = ConnectionStatus::Disconnected;
            session.scope.take()
        };
        if scope.is_some() {
            info!("Brick disconnected");
        }
        drop(scope);
        self.link.reset_session();
    }

    fn end_session(&self) {
        let (scope, pump) = {
            let mut session = self.session();
            session.status = ConnectionStatus::Disconnected;
            session.found = None;
            (session.scope.take(), session.pump.take())
        };

        if let Some(pump) = pump {
            pump.abort();
        }
        if scope.is_some() || self.link.is_connected() {
            self.link.transport().disconnect();
        }
        drop(scope);
        self.link.reset_session();
    }

    // ------------------------------------------------------------------
    // Motors
    // ------------------------------------------------------------------

    /// Run `f` on the motor at `port`, if one is attached
    fn with_motor<T>(&self, port: usize, f: impl FnOnce(&mut Motor) -> T) -> Option<T> {
        let mut state = self.link.state();
        state.registry.motor_mut(port).map(f)
    }

    pub fn set_power(&self, port: usize, power: u8) {
        self.with_motor(port, |m| m.set_power(power));
    }

    pub fn set_direction(&self, port: usize, direction: i32) {
        self.with_motor(port, |m| m.set_direction(direction));
    }

    /// Run for `duration_ms`, then coast unless another command supersedes it
    pub fn run_for(&self, port: usize, duration_ms: u32) {
        let Some(run) = self.with_motor(port, |m| m.run_for(duration_ms)).flatten() else {
            return;
        };
        self.link.send(&run.frame);

        let delay = Duration::from_millis(
            u64::from(duration_ms) + self.link.settings().coast_delay_ms,
        );
        let link = self.link.clone();
        self.spawn_in_session(async move {
            tokio::time::sleep(delay).await;
            let frame = link
                .state()
                .registry
                .motor_mut(port)
                .and_then(|m| m.coast_if_current(run.coast_token));
            if let Some(frame) = frame {
                debug!("Deferred coast on port {}", port_letter(port));
                link.send(&frame);
            }
        });
    }

    pub fn run_continuous(&self, port: usize) {
        if let Some(frame) = self.with_motor(port, Motor::run_continuous).flatten() {
            self.link.send(&frame);
        }
    }

    /// Rotate by `degrees` (sign picks the direction) and wait for motion to settle
    ///
    /// Completes when the motor is within tolerance of its target, when it
    /// stops moving, or when the connection ends.
    pub async fn rotate(&self, port: usize, degrees: i32) {
        let limits = self.link.settings().rotation_limits();
        let rotation = self.with_motor(port, |m| m.rotate(degrees, limits));
        let Some((frame, mut watch)) = rotation.flatten() else {
            return;
        };
        self.link.send(&frame);

        let Some(token) = self.session_token() else {
            return;
        };
        let sample = Duration::from_millis(self.link.settings().rotation_sample_ms);
        let settle = Duration::from_millis(self.link.settings().rotation_settle_ms);

        loop {
            let Some(position) = self.position(port) else {
                return;
            };
            if watch.observe(position) {
                break;
            }
            if !token.sleep(sample).await {
                return;
            }
        }

        debug!(
            "Motor {} settled near {} (target {})",
            port_letter(port),
            self.position(port).unwrap_or_default(),
            watch.target()
        );
        token.sleep(settle).await;
    }

    /// Rotate to an absolute position relative to the last zero
    pub async fn rotate_to(&self, port: usize, position: i64) {
        let Some(current) = self.position(port) else {
            return;
        };
        let delta = (position - current).clamp(i64::from(i32::MIN), i64::from(i32::MAX));
        self.rotate(port, delta as i32).await;
    }

    /// Drive two motors together so both finish their travel at the same time
    ///
    /// Speeds are signed powers in `-100..=100`; the faster motor covers
    /// `degrees` and the slower one a proportional share.
    pub async fn rotate_pair(
        &self,
        (port_a, speed_a): (usize, i32),
        (port_b, speed_b): (usize, i32),
        degrees: i32,
    ) {
        let power_a = speed_a.clamp(-100, 100).unsigned_abs();
        let power_b = speed_b.clamp(-100, 100).unsigned_abs();
        let max_power = power_a.max(power_b).max(1);

        let travel = |power: u32, speed: i32| {
            let share = f64::from(degrees) * f64::from(power) / f64::from(max_power);
            let share = share.round() as i32;
            if speed < 0 {
                -share
            } else {
                share
            }
        };

        self.set_power(port_a, power_a as u8);
        self.set_power(port_b, power_b as u8);
        tokio::join!(
            self.rotate(port_a, travel(power_a, speed_a)),
            self.rotate(port_b, travel(power_b, speed_b)),
        );
    }

    pub fn coast(&self, port: usize) {
        if let Some(frame) = self.with_motor(port, |m| m.coast()).flatten() {
            self.link.send(&frame);
        }
    }

    pub fn brake(&self, port: usize) {
        if let Some(frame) = self.with_motor(port, |m| m.brake()).flatten() {
            self.link.send(&frame);
        }
    }

    /// Zero the motor's logical position
    pub fn reset_position(&self, port: usize) {
        let hardware = self.link.settings().hardware_position_reset;
        let frame = self
            .with_motor(port, |m| {
                if hardware {
                    Some(m.hardware_reset())
                } else {
                    m.reset_position();
                    None
                }
            })
            .flatten();
        if let Some(frame) = frame {
            self.link.send(&frame);
        }
    }

    pub fn position(&self, port: usize) -> Option<i64> {
        self.link.state().registry.motor(port).map(Motor::position)
    }

    pub fn motor_kind(&self, port: usize) -> Option<DeviceKind> {
        self.link.state().registry.motor(port).map(Motor::kind)
    }

    // ------------------------------------------------------------------
    // Sensors
    // ------------------------------------------------------------------

    /// Distance in cm, clamped to `0..=255` and rounded to two decimals
    pub fn distance(&self, port: Option<usize>) -> Option<f32> {
        let state = self.link.state();
        let port = resolve_sensor(&state.registry, port, DeviceKind::Ultrasonic)?;
        let raw = state.registry.value(SensorCategory::Distance, port);
        Some((raw.clamp(0.0, 255.0) * 100.0).round() / 100.0)
    }

    pub fn brightness(&self, port: Option<usize>) -> Option<f32> {
        self.read_color_sensor(port, ColorSensorMode::Brightness)
    }

    pub fn color(&self, port: Option<usize>) -> Option<f32> {
        self.read_color_sensor(port, ColorSensorMode::Color)
    }

    /// Switch the colour sensor to `mode` and return its last reading in that mode
    ///
    /// The new mode applies from the next poll on. The reply to a poll that
    /// was already in flight is dropped, so until a reading in the new mode
    /// arrives the previous value for that mode is returned.
    pub fn read_color_sensor(&self, port: Option<usize>, mode: ColorSensorMode) -> Option<f32> {
        let mut state = self.link.state();
        let port = resolve_sensor(&state.registry, port, DeviceKind::Color)?;
        state.registry.set_color_mode(port, mode);
        Some(state.registry.value(mode.category(), port))
    }

    pub fn angle(&self, port: Option<usize>) -> Option<f32> {
        let state = self.link.state();
        let port = resolve_sensor(&state.registry, port, DeviceKind::Gyro)?;
        Some(state.registry.value(SensorCategory::Angle, port))
    }

    pub fn is_button_pressed(&self, port: usize) -> bool {
        self.link.state().registry.value(SensorCategory::Buttons, port) == 1.0
    }

    /// Zero the gyro at `port` (or the first gyro)
    pub async fn reset_gyro(&self, port: Option<usize>) -> CalibrationOutcome {
        let Some(token) = self.session_token() else {
            return CalibrationOutcome::Skipped;
        };

        let port = {
            let mut state = self.link.state();
            let Some(port) = resolve_sensor(&state.registry, port, DeviceKind::Gyro) else {
                return CalibrationOutcome::Skipped;
            };
            if state.registry.value(SensorCategory::Angle, port) == 0.0 {
                return CalibrationOutcome::Skipped;
            }
            if !state.calibration.begin(port) {
                return CalibrationOutcome::Skipped;
            }
            port
        };

        info!("Resetting gyro on port {}", port + 1);
        let link = self.link.clone();
        // Detached: the port must get back to idle even if this future is dropped
        let handle =
            tokio::spawn(async move { calibrator::reset_gyro(&link, port, &token).await });
        handle.await.unwrap_or(CalibrationOutcome::Cancelled)
    }

    // ------------------------------------------------------------------
    // Brick
    // ------------------------------------------------------------------

    pub fn beep(&self, freq: u16, duration_ms: u16) {
        self.send_ops(&protocol::tone_ops(freq, duration_ms));
    }

    pub fn led(&self, color: LedColor, status: LedStatus) {
        self.send_ops(&protocol::led_ops(led_pattern(color, status)));
    }

    pub fn stop_sound(&self) {
        self.send_ops(&protocol::stop_sound_ops());
    }

    pub fn stop_all_motors(&self) {
        let frames: Vec<Vec<u8>> = {
            let state = self.link.state();
            state.registry.motors().filter_map(Motor::coast).collect()
        };
        for frame in frames {
            self.link.send(&frame);
        }
    }

    /// Coast every motor, silence the speaker and switch the light off
    pub fn stop_all(&self) {
        self.stop_all_motors();
        self.stop_sound();
        self.send_ops(&protocol::led_ops(0));
    }

    fn send_ops(&self, ops: &[u8]) {
        self.link.send(&encode(CommandType::NoReply, ops, 0));
    }
}

/// Explicit port if it holds `kind`, else the first port that does
fn resolve_sensor(
    registry: &DeviceRegistry,
    port: Option<usize>,
    kind: DeviceKind,
) -> Option<usize> {
    let port = match port {
        Some(port) => port,
        None => registry.first_sensor(kind)?,
    };
    (registry.sensor_kind(port) == Some(kind)).then_some(port)
}
