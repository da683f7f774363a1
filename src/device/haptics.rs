use crate::host::{ControllerRole, HapticVibration};
use tracing::debug;

/// Receives haptic requests addressed to a controller.
pub trait HapticResponder: Send + Sync {
    fn vibrate(&self, role: ControllerRole, vibration: &HapticVibration);
}

// Default responder: the simulated controller has no motor, so just log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHaptics;

impl HapticResponder for LogHaptics {
    fn vibrate(&self, role: ControllerRole, vibration: &HapticVibration) {
        debug!(
            "{} controller haptic pulse: {:.3}s at {:.1}Hz, amplitude {:.2}",
            role, vibration.duration_seconds, vibration.frequency, vibration.amplitude
        );
    }
}
