//! Gyro Calibrator
//!
//! Forces a gyro's running angle back to zero. Each cycle switches the
//! sensor into its reset mode, lets polling resume in normal mode and then
//! re-reads the angle until it is zero or the attempt budget runs out.

use crate::domain::calibration::{reset_frame, CalibrationPhase};
use crate::domain::models::{CalibrationOutcome, SensorCategory};
use crate::infrastructure::bluetooth::link::Link;
use crate::infrastructure::tasks::CancelToken;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run the reset loop on a port already marked `Zeroing`
pub(crate) async fn reset_gyro(
    link: &Link,
    port: usize,
    token: &CancelToken,
) -> CalibrationOutcome {
    let settings = link.settings();
    let start_delay = Duration::from_millis(settings.gyro_start_delay_ms);
    let settle = Duration::from_millis(settings.gyro_settle_ms);
    let confirm = Duration::from_millis(settings.gyro_confirm_ms);
    let max_attempts = settings.gyro_max_attempts;

    if !token.sleep(start_delay).await {
        return CalibrationOutcome::Cancelled;
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        link.send(&reset_frame(port));

        if !token.sleep(settle).await {
            return CalibrationOutcome::Cancelled;
        }
        link.state().calibration.set(port, CalibrationPhase::Settling);

        if !token.sleep(confirm).await {
            return CalibrationOutcome::Cancelled;
        }

        let mut state = link.state();
        let angle = state.registry.value(SensorCategory::Angle, port);
        if angle == 0.0 {
            state.calibration.set(port, CalibrationPhase::Idle);
            info!("Gyro on port {} zeroed after {} attempt(s)", port + 1, attempts);
            return CalibrationOutcome::Zeroed;
        }

        if max_attempts.is_some_and(|max| attempts >= max) {
            state.calibration.set(port, CalibrationPhase::Idle);
            warn!(
                "Gyro on port {} still reads {} after {} attempts, giving up",
                port + 1,
                angle,
                attempts
            );
            return CalibrationOutcome::GaveUp { attempts };
        }

        debug!("Gyro on port {} reads {}, retrying", port + 1, angle);
        state.calibration.set(port, CalibrationPhase::Zeroing);
    }
}
