//! Motor State
//!
//! Power, direction, position and command bookkeeping for one motor port.
//! Every actuation returns the frame to send; the motor never talks to the
//! transport itself.

use crate::domain::models::DeviceKind;
use crate::infrastructure::bluetooth::protocol::{
    self, encode, num32, num8, opcode, port_mask, run_value, signed_speed, value, CommandType,
};

/// Run value used for open-ended speed commands
const CONTINUOUS_RUN: u32 = 0xffff;

/// Trapezoidal speed profile: ramp up, steady phase, ramp down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampProfile {
    pub ramp_up: u32,
    pub run: u32,
    pub ramp_down: u32,
}

impl RampProfile {
    /// Profile of a timed run, in milliseconds
    pub fn timed(duration_ms: u32) -> Self {
        let ramp = value::LONG_RAMP;
        if duration_ms < ramp * 2 {
            let ramp_up = duration_ms / 2;
            Self {
                ramp_up,
                run: 0,
                ramp_down: duration_ms - ramp_up,
            }
        } else {
            Self {
                ramp_up: ramp,
                run: duration_ms - ramp * 2,
                ramp_down: ramp,
            }
        }
    }

    /// Profile of a positional move, in degrees
    pub fn positional(degrees: u32) -> Self {
        let ramp = (degrees / 4).min(value::LONG_RAMP);
        Self {
            ramp_up: ramp,
            run: degrees - ramp * 2,
            ramp_down: ramp,
        }
    }
}

/// Tuning of the rotation convergence wait
#[derive(Debug, Clone, Copy)]
pub struct RotationLimits {
    /// Unchanged samples before the motor is considered stalled
    pub stall_samples: u32,
    /// Distance from target that counts as arrived
    pub tolerance: i64,
}

/// Tracks a positional move until the motor arrives or stalls
#[derive(Debug, Clone)]
pub struct RotationWatch {
    target: i64,
    forward: bool,
    last: Option<i64>,
    stalled: u32,
    limits: RotationLimits,
}

impl RotationWatch {
    pub fn new(target: i64, forward: bool, limits: RotationLimits) -> Self {
        Self {
            target,
            forward,
            last: None,
            stalled: 0,
            limits,
        }
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    /// Feed one position sample; returns `true` once motion has settled
    pub fn observe(&mut self, position: i64) -> bool {
        if self.last == Some(position) {
            self.stalled += 1;
        } else {
            self.stalled = 0;
        }
        self.last = Some(position);

        if self.stalled >= self.limits.stall_samples {
            return true;
        }
        if self.forward {
            position >= self.target - self.limits.tolerance
        } else {
            position <= self.target + self.limits.tolerance
        }
    }
}

/// A timed run frame plus the token its deferred coast must present
#[derive(Debug, Clone)]
pub struct TimedRun {
    pub frame: Vec<u8>,
    pub coast_token: u64,
}

/// One motor attached to an output port
#[derive(Debug, Clone)]
pub struct Motor {
    port: usize,
    kind: DeviceKind,
    power: u8,
    reverse: bool,
    raw_position: i64,
    zero_offset: Option<i64>,
    command_seq: u64,
    pending_coast: Option<u64>,
}

impl Motor {
    pub fn new(port: usize, kind: DeviceKind, power: u8) -> Self {
        Self {
            port,
            kind,
            power: power.min(100),
            reverse: false,
            raw_position: 0,
            zero_offset: None,
            command_seq: 0,
            pending_coast: None,
        }
    }

    pub fn port(&self) -> usize {
        self.port
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: DeviceKind) {
        self.kind = kind;
    }

    pub fn power(&self) -> u8 {
        self.power
    }

    pub fn set_power(&mut self, power: u8) {
        self.power = power.min(100);
    }

    /// `1` or `-1`
    pub fn direction(&self) -> i8 {
        if self.reverse {
            -1
        } else {
            1
        }
    }

    /// Any negative value reverses, anything else runs forward
    pub fn set_direction(&mut self, direction: i32) {
        self.reverse = direction < 0;
    }

    /// Store a raw tacho count; the first one becomes the zero point
    pub fn update_position(&mut self, raw: [u8; 4]) {
        self.raw_position = protocol::decode_count(raw);
        if self.zero_offset.is_none() {
            self.zero_offset = Some(self.raw_position);
        }
    }

    /// Position relative to the last software zero
    pub fn position(&self) -> i64 {
        self.raw_position - self.zero_offset.unwrap_or(0)
    }

    /// Snap the logical position to zero without touching the device
    pub fn reset_position(&mut self) {
        self.zero_offset = Some(self.raw_position);
    }

    /// Reset the tacho on the brick; the next reading becomes the new zero
    pub fn hardware_reset(&mut self) -> Vec<u8> {
        self.raw_position = 0;
        self.zero_offset = None;
        encode(CommandType::NoReply, &protocol::reset_ops(self.port), 0)
    }

    /// Timed run, followed later by a coast if nothing supersedes it
    pub fn run_for(&mut self, duration_ms: u32) -> Option<TimedRun> {
        if self.power == 0 {
            return None;
        }
        let frame = self.time_speed_frame(RampProfile::timed(duration_ms));
        Some(TimedRun {
            frame,
            coast_token: self.arm_coast(),
        })
    }

    /// Run at the current speed until told otherwise
    pub fn run_continuous(&mut self) -> Option<Vec<u8>> {
        if self.power == 0 {
            return None;
        }
        self.supersede();
        let ramp = value::LONG_RAMP;
        Some(self.time_speed_frame(RampProfile {
            ramp_up: ramp,
            run: CONTINUOUS_RUN,
            ramp_down: ramp,
        }))
    }

    /// Positional move by `delta` degrees; the sign of `delta` picks the direction
    pub fn rotate(
        &mut self,
        delta: i32,
        limits: RotationLimits,
    ) -> Option<(Vec<u8>, RotationWatch)> {
        if self.power == 0 {
            return None;
        }
        self.supersede();

        let forward = delta >= 0;
        let target = self.position() + delta as i64;
        let profile = RampProfile::positional(delta.unsigned_abs());

        let mut ops = vec![
            opcode::OUTPUT_STEP_SPEED,
            value::LAYER,
            port_mask(self.port),
        ];
        ops.extend_from_slice(&num8(signed_speed(self.power, !forward)));
        ops.extend_from_slice(&num32(profile.ramp_up));
        ops.extend_from_slice(&num32(profile.run));
        ops.extend_from_slice(&num32(profile.ramp_down));
        ops.push(value::BRAKE);

        let frame = encode(CommandType::NoReply, &ops, 0);
        Some((frame, RotationWatch::new(target, forward, limits)))
    }

    pub fn coast(&self) -> Option<Vec<u8>> {
        self.stop_frame(false)
    }

    pub fn brake(&self) -> Option<Vec<u8>> {
        self.stop_frame(true)
    }

    /// Coast frame for a deferred coast, if its token is still current
    pub fn coast_if_current(&mut self, token: u64) -> Option<Vec<u8>> {
        if self.pending_coast != Some(token) {
            return None;
        }
        self.pending_coast = None;
        self.coast()
    }

    fn arm_coast(&mut self) -> u64 {
        self.command_seq += 1;
        self.pending_coast = Some(self.command_seq);
        self.command_seq
    }

    fn supersede(&mut self) {
        self.command_seq += 1;
        self.pending_coast = None;
    }

    fn stop_frame(&self, brake: bool) -> Option<Vec<u8>> {
        if self.power == 0 {
            return None;
        }
        Some(encode(
            CommandType::NoReply,
            &protocol::stop_ops(self.port, brake),
            0,
        ))
    }

    fn time_speed_frame(&self, profile: RampProfile) -> Vec<u8> {
        let mut ops = vec![
            opcode::OUTPUT_TIME_SPEED,
            value::LAYER,
            port_mask(self.port),
        ];
        ops.extend_from_slice(&num8(signed_speed(self.power, self.reverse)));
        ops.extend_from_slice(&num8(profile.ramp_up as u8));
        ops.extend_from_slice(&run_value(profile.run));
        ops.extend_from_slice(&num8(profile.ramp_down as u8));
        ops.push(value::BRAKE);
        encode(CommandType::NoReply, &ops, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: RotationLimits = RotationLimits {
        stall_samples: 20,
        tolerance: 5,
    };

    fn motor() -> Motor {
        Motor::new(1, DeviceKind::LargeMotor, 50)
    }

    #[test]
    fn test_timed_profile() {
        assert_eq!(
            RampProfile::timed(2000),
            RampProfile {
                ramp_up: 50,
                run: 1900,
                ramp_down: 50
            }
        );
        assert_eq!(
            RampProfile::timed(60),
            RampProfile {
                ramp_up: 30,
                run: 0,
                ramp_down: 30
            }
        );
        let odd = RampProfile::timed(61);
        assert_eq!((odd.ramp_up, odd.ramp_down), (30, 31));
    }

    #[test]
    fn test_positional_profile_keeps_total_distance() {
        let short = RampProfile::positional(90);
        assert_eq!((short.ramp_up, short.run, short.ramp_down), (22, 46, 22));
        let long = RampProfile::positional(720);
        assert_eq!((long.ramp_up, long.run, long.ramp_down), (50, 620, 50));
    }

    #[test]
    fn test_run_for_frame() {
        let mut m = motor();
        assert_eq!(m.direction(), 1);
        m.set_direction(-3);
        assert_eq!(m.direction(), -1);
        let run = m.run_for(2000).unwrap();
        assert_eq!(
            &run.frame[7..],
            &[0xAF, 0x00, 0x02, 0x81, 0xCE, 0x81, 50, 0x82, 0x6C, 0x07, 0x81, 50, 0x01]
        );
    }

    #[test]
    fn test_run_continuous_uses_long_run_value() {
        let frame = motor().run_continuous().unwrap();
        assert_eq!(
            &frame[7..],
            &[0xAF, 0x00, 0x02, 0x81, 50, 0x81, 50, 0x83, 0xFF, 0xFF, 0x00, 0x00, 0x81, 50, 0x01]
        );
    }

    #[test]
    fn test_rotate_frame_and_target() {
        let mut m = motor();
        m.update_position(100i32.to_le_bytes());
        m.update_position(130i32.to_le_bytes());
        let (frame, watch) = m.rotate(-90, LIMITS).unwrap();
        assert_eq!(watch.target(), 30 - 90);
        assert_eq!(
            &frame[7..],
            &[
                0xAE, 0x00, 0x02, 0x81, 0xCE, 0x83, 22, 0, 0, 0, 0x83, 46, 0, 0, 0, 0x83, 22, 0,
                0, 0, 0x01
            ]
        );
    }

    #[test]
    fn test_zero_power_is_a_no_op() {
        let mut m = motor();
        m.set_power(0);
        assert!(m.coast().is_none());
        assert!(m.coast().is_none());
        assert!(m.brake().is_none());
        assert!(m.run_for(500).is_none());
        assert!(m.run_continuous().is_none());
        assert!(m.rotate(90, LIMITS).is_none());
    }

    #[test]
    fn test_position_offsets() {
        let mut m = motor();
        assert_eq!(m.position(), 0);
        let raw = 500i32.to_le_bytes();
        m.update_position(raw);
        assert_eq!(m.position(), 0);
        m.update_position(560i32.to_le_bytes());
        assert_eq!(m.position(), 60);
        m.reset_position();
        m.update_position(560i32.to_le_bytes());
        assert_eq!(m.position(), 0);
        m.update_position((-40i32).to_le_bytes());
        assert_eq!(m.position(), -600);
    }

    #[test]
    fn test_hardware_reset_rezeroes_on_next_reading() {
        let mut m = motor();
        m.update_position(10i32.to_le_bytes());
        m.update_position(400i32.to_le_bytes());
        let frame = m.hardware_reset();
        assert_eq!(&frame[7..], &[0xA2, 0x00, 0x02]);
        assert_eq!(m.position(), 0);
        m.update_position(3i32.to_le_bytes());
        assert_eq!(m.position(), 0);
        m.update_position(33i32.to_le_bytes());
        assert_eq!(m.position(), 30);
    }

    #[test]
    fn test_newer_command_invalidates_deferred_coast() {
        let mut m = motor();
        let first = m.run_for(1000).unwrap().coast_token;
        let second = m.run_for(1000).unwrap().coast_token;
        assert!(second > first);
        assert!(m.coast_if_current(first).is_none());
        assert!(m.coast_if_current(second).is_some());
        // consumed
        assert!(m.coast_if_current(second).is_none());

        let third = m.run_for(1000).unwrap().coast_token;
        m.run_continuous();
        assert!(m.coast_if_current(third).is_none());
    }

    #[test]
    fn test_rotation_watch_arrives_forward() {
        let mut watch = RotationWatch::new(360, true, LIMITS);
        assert!(!watch.observe(0));
        assert!(!watch.observe(200));
        assert!(!watch.observe(354));
        assert!(watch.observe(355));
    }

    #[test]
    fn test_rotation_watch_arrives_backward() {
        let mut watch = RotationWatch::new(-90, false, LIMITS);
        assert!(!watch.observe(0));
        assert!(!watch.observe(-84));
        assert!(watch.observe(-85));
    }

    #[test]
    fn test_rotation_watch_detects_stall() {
        let mut watch = RotationWatch::new(1000, true, LIMITS);
        assert!(!watch.observe(10));
        for _ in 0..19 {
            assert!(!watch.observe(10));
        }
        assert!(watch.observe(10));
    }
}
