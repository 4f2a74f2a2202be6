use serde::{Deserialize, Serialize};

/// Number of sensor ports (1-4) and of motor ports (A-D)
pub const PORT_COUNT: usize = 4;

/// Device kind reported by the brick for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Touch,
    Color,
    Ultrasonic,
    Gyro,
    MediumMotor,
    LargeMotor,
    /// Nothing attached
    Absent,
}

impl DeviceKind {
    /// Map a raw device type code (EV3 Firmware Developer Kit, section 5)
    pub fn from_code(code: u8) -> Self {
        match code {
            29 => Self::Color,
            30 => Self::Ultrasonic,
            32 => Self::Gyro,
            16 => Self::Touch,
            8 => Self::MediumMotor,
            7 => Self::LargeMotor,
            _ => Self::Absent,
        }
    }

    pub fn is_motor(&self) -> bool {
        matches!(self, Self::MediumMotor | Self::LargeMotor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Touch => "touch",
            Self::Color => "color",
            Self::Ultrasonic => "ultrasonic",
            Self::Gyro => "gyro",
            Self::MediumMotor => "mediumMotor",
            Self::LargeMotor => "largeMotor",
            Self::Absent => "none",
        }
    }
}

/// Which cache a sensor value lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCategory {
    Distance,
    Angle,
    Brightness,
    Buttons,
    Color,
}

/// Sub-mode of a colour sensor, selected by the last query made on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSensorMode {
    /// Ambient light intensity
    #[default]
    Brightness,
    /// Detected colour code
    Color,
}

impl ColorSensorMode {
    /// Device mode byte used in `READSI`
    pub fn mode_byte(&self) -> u8 {
        match self {
            Self::Brightness => 1,
            Self::Color => 2,
        }
    }

    pub fn category(&self) -> SensorCategory {
        match self {
            Self::Brightness => SensorCategory::Brightness,
            Self::Color => SensorCategory::Color,
        }
    }
}

/// Status light colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Green = 1,
    Red = 2,
    Orange = 3,
}

/// Status light pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedStatus {
    Off = 0,
    On = 1,
    Flash = 2,
    Pulse = 3,
}

/// Pattern byte understood by the brick's `UI_WRITE LED`
pub fn led_pattern(color: LedColor, status: LedStatus) -> u8 {
    match status {
        LedStatus::Off => 0,
        status => (status as u8 - 1) * 3 + color as u8,
    }
}

/// How a gyro reset finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// The gyro reads zero
    Zeroed,
    /// Nothing to do: not a gyro, already zero, or already calibrating
    Skipped,
    /// Attempt budget exhausted without reading zero
    GaveUp { attempts: u32 },
    /// The connection went away mid-calibration
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Peripheral found while scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedDevice {
    pub id: String,
    pub name: String,
    pub rssi: i16,
}

/// Events delivered by the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    DeviceFound(ScannedDevice),
    Connected,
    Disconnected,
    /// One raw inbound message
    Message(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_codes() {
        assert_eq!(DeviceKind::from_code(29), DeviceKind::Color);
        assert_eq!(DeviceKind::from_code(7), DeviceKind::LargeMotor);
        assert_eq!(DeviceKind::from_code(125), DeviceKind::Absent);
        assert_eq!(DeviceKind::from_code(126), DeviceKind::Absent);
        assert_eq!(DeviceKind::from_code(99), DeviceKind::Absent);
        assert!(DeviceKind::MediumMotor.is_motor());
        assert!(!DeviceKind::Gyro.is_motor());
    }

    #[test]
    fn test_led_pattern() {
        assert_eq!(led_pattern(LedColor::Red, LedStatus::Off), 0);
        assert_eq!(led_pattern(LedColor::Green, LedStatus::On), 1);
        assert_eq!(led_pattern(LedColor::Orange, LedStatus::Flash), 6);
        assert_eq!(led_pattern(LedColor::Red, LedStatus::Pulse), 8);
    }
}
