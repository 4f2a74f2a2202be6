//! Brick Link
//!
//! Shared state of one brick: the transport, the settings it was created
//! with and everything learned from replies. Locks are held only for short
//! synchronous sections and never across an await.

use crate::domain::calibration::GyroCalibrations;
use crate::domain::registry::DeviceRegistry;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::poller::{PollPlanner, ReplyKind};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::Transport;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

pub(crate) struct BrickState {
    pub registry: DeviceRegistry,
    pub calibration: GyroCalibrations,
    pub poller: PollPlanner,
}

pub(crate) struct Link {
    transport: Arc<dyn Transport>,
    settings: Settings,
    state: Mutex<BrickState>,
}

impl Link {
    pub fn new(transport: Arc<dyn Transport>, settings: Settings) -> Self {
        let state = BrickState {
            registry: DeviceRegistry::new(settings.default_motor_power),
            calibration: GyroCalibrations::default(),
            poller: PollPlanner::new(settings.device_list_every),
        };
        Self {
            transport,
            settings,
            state: Mutex::new(state),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn state(&self) -> MutexGuard<'_, BrickState> {
        // State stays usable if a holder panicked mid-update
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire-and-forget send; silently dropped while disconnected
    pub fn send(&self, frame: &[u8]) {
        if !self.transport.is_connected() {
            return;
        }
        trace!("TX {:02X?}", frame);
        if let Err(e) = self.transport.send_message(frame) {
            warn!("Failed to send frame to brick: {}", e);
        }
    }

    /// Route one inbound message to the registry
    pub fn handle_message(&self, bytes: &[u8]) {
        trace!("RX {:02X?}", bytes);
        let payload = match protocol::parse_reply(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Discarding reply: {}", e);
                return;
            }
        };

        let mut state = self.state();
        match state.poller.classify(payload) {
            Some(ReplyKind::DeviceList) => state.registry.apply_device_list(payload),
            Some(ReplyKind::Values) => state.registry.apply_sensor_values(payload),
            None => debug!("Discarding unexpected {}-byte reply", payload.len()),
        }
    }

    /// Forget everything tied to the current connection
    pub fn reset_session(&self) {
        let mut state = self.state();
        state.registry.clear();
        state.calibration.reset();
        state.poller.reset();
    }
}
