//! Gyro Calibration State
//!
//! Per-port progress of gyro zeroing, owned by one brick connection.

use crate::domain::models::PORT_COUNT;
use crate::infrastructure::bluetooth::protocol::{encode, read_si_ops, CommandType};

/// Gyro device mode that zeroes the running angle
pub const GYRO_RESET_MODE: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationPhase {
    #[default]
    Idle,
    /// Reset mode forced on the sensor, polling suspended
    Zeroing,
    /// Back in normal mode, waiting to read the angle again
    Settling,
}

#[derive(Debug, Clone, Default)]
pub struct GyroCalibrations {
    phases: [CalibrationPhase; PORT_COUNT],
}

impl GyroCalibrations {
    pub fn phase(&self, port: usize) -> CalibrationPhase {
        self.phases.get(port).copied().unwrap_or_default()
    }

    pub fn set(&mut self, port: usize, phase: CalibrationPhase) {
        if let Some(slot) = self.phases.get_mut(port) {
            *slot = phase;
        }
    }

    /// Move an idle port into `Zeroing`; `false` if it was already busy
    pub fn begin(&mut self, port: usize) -> bool {
        if self.phase(port) != CalibrationPhase::Idle || port >= PORT_COUNT {
            return false;
        }
        self.set(port, CalibrationPhase::Zeroing);
        true
    }

    /// Polling must pause while any port is zeroing
    pub fn suspends_polling(&self) -> bool {
        self.phases.contains(&CalibrationPhase::Zeroing)
    }

    pub fn reset(&mut self) {
        self.phases = Default::default();
    }
}

/// `READSI` in reset mode for one gyro port
pub fn reset_frame(port: usize) -> Vec<u8> {
    encode(
        CommandType::NoReply,
        &read_si_ops(port as u8, GYRO_RESET_MODE, 0),
        0,
    )
}
