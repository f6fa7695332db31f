use crate::errors::{DeskPilotError, DeskPilotResult};

/// Raw access to the OS screenshot primitive.
///
/// Implementations block; the capture service calls them from `spawn_blocking`.
pub trait ScreenSource: Send + Sync {
    /// Captures the whole primary display at native resolution.
    fn capture_native(&self) -> DeskPilotResult<image::RgbaImage>;
}

/// Primary-monitor capture through `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl ScreenSource for XcapScreen {
    fn capture_native(&self) -> DeskPilotResult<image::RgbaImage> {
        // The monitor containing the origin is the primary one on every supported platform.
        let monitor = xcap::Monitor::from_point(0, 0)
            .map_err(|e| DeskPilotError::Capture(format!("no display available: {e}")))?;
        monitor
            .capture_image()
            .map_err(|e| DeskPilotError::Capture(e.to_string()))
    }
}
