//! Polling Scheduler
//!
//! Alternates between rediscovering attached devices and reading the
//! current sensor values and tacho counts. Planning is synchronous and
//! pure; [`run`] drives it from a timer inside the connection scope.

use crate::domain::models::{DeviceKind, PORT_COUNT};
use crate::domain::registry::DeviceRegistry;
use crate::infrastructure::bluetooth::link::{BrickState, Link};
use crate::infrastructure::bluetooth::protocol::{
    device_list_ops, encode, get_count_ops, read_si_ops, CommandType, DEVICE_LIST_ALLOCATION,
    VALUES_ALLOCATION, VALUE_SLOT_SIZE,
};
use crate::infrastructure::tasks::CancelToken;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Global offset of the first motor slot
const MOTOR_SLOT_BASE: usize = PORT_COUNT * VALUE_SLOT_SIZE as usize;

/// What a single timer tick decided to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTick {
    /// A gyro is zeroing; the counter did not move
    Skipped,
    /// Nothing to send yet
    Idle,
    DeviceList(Vec<u8>),
    Values(Vec<u8>),
}

/// Registry update a reply payload feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    DeviceList,
    Values,
}

#[derive(Debug, Clone)]
pub struct PollPlanner {
    counter: u64,
    expect_device_list: bool,
    device_list_every: u64,
}

impl PollPlanner {
    pub fn new(device_list_every: u32) -> Self {
        Self {
            counter: 0,
            expect_device_list: false,
            device_list_every: u64::from(device_list_every.max(1)),
        }
    }

    /// Decide the frame for the next tick
    pub fn plan(&mut self, registry: &DeviceRegistry, suspended: bool) -> PollTick {
        if suspended {
            return PollTick::Skipped;
        }

        let tick = if self.counter % self.device_list_every == 0 {
            self.expect_device_list = true;
            PollTick::DeviceList(device_list_frame())
        } else if registry.is_resolved() {
            PollTick::Values(values_frame(registry))
        } else {
            PollTick::Idle
        };

        self.counter += 1;
        tick
    }

    pub fn expects_device_list(&self) -> bool {
        self.expect_device_list
    }

    /// Consume the "device list comes next" flag
    pub fn take_device_list_expectation(&mut self) -> bool {
        std::mem::take(&mut self.expect_device_list)
    }

    /// Match a reply payload to the request it answers
    ///
    /// The two requests reserve different reply sizes, so a values reply
    /// that arrives after a device list request went out is still read as
    /// values. A device-list-sized payload is only accepted while a device
    /// list is outstanding. Anything else is `None`.
    pub fn classify(&mut self, payload: &[u8]) -> Option<ReplyKind> {
        let len = payload.len();
        if len == usize::from(DEVICE_LIST_ALLOCATION) {
            self.take_device_list_expectation().then_some(ReplyKind::DeviceList)
        } else if len == usize::from(VALUES_ALLOCATION) {
            Some(ReplyKind::Values)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.expect_device_list = false;
    }
}

pub fn device_list_frame() -> Vec<u8> {
    encode(CommandType::Reply, &device_list_ops(), DEVICE_LIST_ALLOCATION)
}

/// One `READSI` per attached sensor plus a `GET_COUNT` per motor port
pub fn values_frame(registry: &DeviceRegistry) -> Vec<u8> {
    let mut ops = Vec::new();
    let slot = VALUE_SLOT_SIZE as usize;

    for port in 0..PORT_COUNT {
        match registry.sensor_kind(port) {
            None | Some(DeviceKind::Absent) => continue,
            Some(_) => {}
        }
        ops.extend_from_slice(&read_si_ops(
            port as u8,
            registry.sensor_mode(port),
            (port * slot) as u8,
        ));
    }

    for port in 0..PORT_COUNT {
        ops.extend_from_slice(&get_count_ops(
            port as u8,
            (MOTOR_SLOT_BASE + port * slot) as u8,
        ));
    }

    encode(CommandType::Reply, &ops, VALUES_ALLOCATION)
}

/// Poll the brick until the scope is cancelled or the transport drops
pub(crate) async fn run(link: Arc<Link>, token: CancelToken) {
    let period = link.settings().polling_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Polling started every {:?}", period);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !link.is_connected() {
            info!("Polling stopped: brick disconnected");
            break;
        }

        let tick = {
            let mut guard = link.state();
            let BrickState {
                registry,
                calibration,
                poller,
            } = &mut *guard;
            poller.plan(registry, calibration.suspends_polling())
        };

        match tick {
            PollTick::Skipped => debug!("Poll skipped while a gyro is zeroing"),
            PollTick::Idle => {}
            PollTick::DeviceList(frame) | PollTick::Values(frame) => link.send(&frame),
        }
    }
}
