//! Device Registry
//!
//! Port mapping, sensor value cache and motor objects, as last reported by
//! the brick. Replies from the polling loop are the only writers of the
//! mapping and the cache.

use crate::domain::models::{ColorSensorMode, DeviceKind, SensorCategory, PORT_COUNT};
use crate::domain::motor::Motor;
use crate::infrastructure::bluetooth::protocol::decode_f32;
use tracing::{debug, info};

/// Payload offset of the first motor entry in a device list reply
const MOTOR_LIST_OFFSET: usize = 16;
/// Minimum payload of a device list reply
const DEVICE_LIST_MIN_LEN: usize = MOTOR_LIST_OFFSET + PORT_COUNT;
/// Payload of a sensor/motor value reply
const VALUES_LEN: usize = 2 * PORT_COUNT * 4;

/// Raw sensor readings, one slot per sensor port and category
#[derive(Debug, Clone, Default)]
pub struct SensorValues {
    distance: [f32; PORT_COUNT],
    angle: [f32; PORT_COUNT],
    brightness: [f32; PORT_COUNT],
    buttons: [f32; PORT_COUNT],
    color: [f32; PORT_COUNT],
}

impl SensorValues {
    fn slots(&self, category: SensorCategory) -> &[f32; PORT_COUNT] {
        match category {
            SensorCategory::Distance => &self.distance,
            SensorCategory::Angle => &self.angle,
            SensorCategory::Brightness => &self.brightness,
            SensorCategory::Buttons => &self.buttons,
            SensorCategory::Color => &self.color,
        }
    }

    fn slots_mut(&mut self, category: SensorCategory) -> &mut [f32; PORT_COUNT] {
        match category {
            SensorCategory::Distance => &mut self.distance,
            SensorCategory::Angle => &mut self.angle,
            SensorCategory::Brightness => &mut self.brightness,
            SensorCategory::Buttons => &mut self.buttons,
            SensorCategory::Color => &mut self.color,
        }
    }

    pub fn get(&self, category: SensorCategory, port: usize) -> f32 {
        self.slots(category).get(port).copied().unwrap_or(0.0)
    }
}

pub struct DeviceRegistry {
    /// `None` until the first device list arrives
    sensor_ports: [Option<DeviceKind>; PORT_COUNT],
    motor_ports: [Option<DeviceKind>; PORT_COUNT],
    values: SensorValues,
    color_modes: [ColorSensorMode; PORT_COUNT],
    /// The next reading may still be in the previous mode
    mode_switched: [bool; PORT_COUNT],
    motors: [Option<Motor>; PORT_COUNT],
    default_power: u8,
}

impl DeviceRegistry {
    pub fn new(default_power: u8) -> Self {
        Self {
            sensor_ports: [None; PORT_COUNT],
            motor_ports: [None; PORT_COUNT],
            values: SensorValues::default(),
            color_modes: [ColorSensorMode::default(); PORT_COUNT],
            mode_switched: [false; PORT_COUNT],
            motors: Default::default(),
            default_power,
        }
    }

    /// Every port has been discovered at least once
    pub fn is_resolved(&self) -> bool {
        self.sensor_ports.iter().all(Option::is_some)
            && self.motor_ports.iter().all(Option::is_some)
    }

    pub fn sensor_kind(&self, port: usize) -> Option<DeviceKind> {
        self.sensor_ports.get(port).copied().flatten()
    }

    pub fn motor_kind(&self, port: usize) -> Option<DeviceKind> {
        self.motor_ports.get(port).copied().flatten()
    }

    /// First sensor port holding a device of `kind`
    pub fn first_sensor(&self, kind: DeviceKind) -> Option<usize> {
        self.sensor_ports.iter().position(|k| *k == Some(kind))
    }

    /// Cache category the port's readings are stored in
    pub fn sensor_category(&self, port: usize) -> Option<SensorCategory> {
        match self.sensor_kind(port)? {
            DeviceKind::Touch => Some(SensorCategory::Buttons),
            DeviceKind::Color => Some(self.color_modes[port].category()),
            DeviceKind::Ultrasonic => Some(SensorCategory::Distance),
            DeviceKind::Gyro => Some(SensorCategory::Angle),
            _ => None,
        }
    }

    /// Device mode byte used when polling the port
    pub fn sensor_mode(&self, port: usize) -> u8 {
        match self.sensor_kind(port) {
            Some(DeviceKind::Color) => self.color_modes[port].mode_byte(),
            _ => 0,
        }
    }

    pub fn color_mode(&self, port: usize) -> ColorSensorMode {
        self.color_modes.get(port).copied().unwrap_or_default()
    }

    /// Poll the colour sensor in `mode` from now on
    ///
    /// A reply already in flight was read in the old mode, so the first
    /// reading after an actual change is dropped.
    pub fn set_color_mode(&mut self, port: usize, mode: ColorSensorMode) {
        let Some(slot) = self.color_modes.get_mut(port) else {
            return;
        };
        if *slot != mode {
            *slot = mode;
            self.mode_switched[port] = true;
        }
    }

    pub fn value(&self, category: SensorCategory, port: usize) -> f32 {
        self.values.get(category, port)
    }

    pub fn motor(&self, port: usize) -> Option<&Motor> {
        self.motors.get(port)?.as_ref()
    }

    pub fn motor_mut(&mut self, port: usize) -> Option<&mut Motor> {
        self.motors.get_mut(port)?.as_mut()
    }

    pub fn motors(&self) -> impl Iterator<Item = &Motor> {
        self.motors.iter().flatten()
    }

    /// Apply a device list reply
    ///
    /// # Payload Structure
    ///
    /// ```text
    /// [0-3]   : Sensor ports 1-4 (device type codes)
    /// [4-15]  : Daisy-chained bricks (ignored)
    /// [16-19] : Motor ports A-D
    /// ```
    pub fn apply_device_list(&mut self, payload: &[u8]) {
        if payload.len() < DEVICE_LIST_MIN_LEN {
            debug!("Device list too short: {} bytes", payload.len());
            return;
        }

        for port in 0..PORT_COUNT {
            let kind = DeviceKind::from_code(payload[port]);
            if self.sensor_ports[port] != Some(kind) {
                info!("Sensor port {}: {}", port + 1, kind.as_str());
            }
            self.sensor_ports[port] = Some(kind);
        }

        for port in 0..PORT_COUNT {
            let kind = DeviceKind::from_code(payload[MOTOR_LIST_OFFSET + port]);
            self.motor_ports[port] = Some(kind);

            let slot = &mut self.motors[port];
            match (slot.is_some(), kind.is_motor()) {
                (true, true) => {
                    if let Some(motor) = slot.as_mut() {
                        motor.set_kind(kind);
                    }
                }
                (false, true) => {
                    info!("Motor attached on port {}: {}", port_letter(port), kind.as_str());
                    *slot = Some(Motor::new(port, kind, self.default_power));
                }
                (true, false) => {
                    info!("Motor detached from port {}", port_letter(port));
                    *slot = None;
                }
                (false, false) => {}
            }
        }
    }

    /// Apply a sensor/motor value reply
    ///
    /// # Payload Structure
    ///
    /// ```text
    /// [0-15]  : Sensor ports 1-4, f32 little-endian each
    /// [16-31] : Motor ports A-D, tacho count i32 little-endian each
    /// ```
    pub fn apply_sensor_values(&mut self, payload: &[u8]) {
        if !self.is_resolved() {
            debug!("Ignoring sensor values before discovery");
            return;
        }
        if payload.len() < VALUES_LEN {
            debug!("Sensor values too short: {} bytes", payload.len());
            return;
        }

        let (sensors, motors) = payload.split_at(PORT_COUNT * 4);

        for (port, chunk) in sensors.chunks_exact(4).enumerate() {
            let Some(category) = self.sensor_category(port) else {
                continue;
            };
            if std::mem::take(&mut self.mode_switched[port]) {
                debug!("Dropping first reading on port {} after mode switch", port + 1);
                continue;
            }
            let value = decode_f32([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.values.slots_mut(category)[port] = if value.is_nan() { 0.0 } else { value };
        }

        for (port, chunk) in motors.chunks_exact(4).take(PORT_COUNT).enumerate() {
            if let Some(motor) = self.motors[port].as_mut() {
                motor.update_position([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
    }

    /// Forget everything learned from the brick
    pub fn clear(&mut self) {
        *self = Self::new(self.default_power);
    }
}

/// Motor port name as printed on the brick
pub fn port_letter(port: usize) -> char {
    (b'A' + port as u8) as char
}
