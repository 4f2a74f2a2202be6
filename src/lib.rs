//! EV3 Link
//!
//! Controls a LEGO EV3 brick over Bluetooth using its binary direct-command
//! protocol: device discovery, sensor polling, motor actuation and gyro
//! calibration. The Bluetooth socket itself is provided by the host through
//! [`Transport`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ev3_link::{BrickService, Settings, Transport};
//! # async fn demo(transport: Arc<dyn Transport>) -> Result<(), ev3_link::BrickError> {
//! let brick = BrickService::new(transport, Settings::default());
//! let mut found = brick.scan()?;
//! if let Some(device) = found.recv().await {
//!     brick.connect_to(&device.id)?;
//! }
//! brick.rotate(0, 360).await;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::models::{
    CalibrationOutcome, ColorSensorMode, ConnectionStatus, DeviceKind, LedColor, LedStatus,
    ScannedDevice, TransportEvent,
};
pub use domain::settings::{DeviceFilter, LogSettings, Settings, SettingsService};
pub use error::BrickError;
pub use infrastructure::bluetooth::{BrickService, Transport};
pub use infrastructure::logging::{init_logger, LoggingGuard};
