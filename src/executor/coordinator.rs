//! Mapping between model space (the possibly downscaled image sent to the model)
//! and native space (physical screen pixels).
use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};

/// A coordinate in the pixel space of the image the model saw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPoint {
    pub x: f64,
    pub y: f64,
}

impl ModelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A physical screen pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativePoint {
    pub x: i32,
    pub y: i32,
}

impl NativePoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for NativePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `floor(dim * scale)` per axis, never below one pixel.
    pub fn scaled(&self, scale: f64) -> ScreenSize {
        ScreenSize {
            width: ((self.width as f64 * scale).floor() as u32).max(1),
            height: ((self.height as f64 * scale).floor() as u32).max(1),
        }
    }
}

/// Result of a model→native conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledTarget {
    pub native: NativePoint,
    /// Whether either axis had to be pulled back onto the screen.
    pub clamped: bool,
}

fn check_scale(scale: f64) -> DeskPilotResult<()> {
    if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
        return Err(DeskPilotError::Config(format!(
            "scale factor must lie in (0, 1], got {scale}"
        )));
    }
    Ok(())
}

/// Converts a model-space point to native space: `(x / s, y / s)`, rounded to the nearest
/// pixel and clamped to `[0, dim - 1]` on each axis.
pub fn model_to_native(
    scale: f64,
    point: ModelPoint,
    screen: ScreenSize,
) -> DeskPilotResult<ScaledTarget> {
    check_scale(scale)?;
    if screen.width == 0 || screen.height == 0 {
        return Err(DeskPilotError::Config(format!(
            "native screen size {}x{} has no pixels",
            screen.width, screen.height
        )));
    }
    if !point.x.is_finite() || !point.y.is_finite() {
        return Err(DeskPilotError::Decode(format!(
            "coordinate ({}, {}) is not a finite number",
            point.x, point.y
        )));
    }

    let raw_x = (point.x / scale).round();
    let raw_y = (point.y / scale).round();
    let max_x = (screen.width - 1) as f64;
    let max_y = (screen.height - 1) as f64;
    let x = raw_x.clamp(0.0, max_x);
    let y = raw_y.clamp(0.0, max_y);

    Ok(ScaledTarget {
        native: NativePoint::new(x as i32, y as i32),
        clamped: x != raw_x || y != raw_y,
    })
}

/// Converts a native point back to model space: `(x * s, y * s)`. Diagnostics only.
pub fn native_to_model(scale: f64, point: NativePoint) -> DeskPilotResult<ModelPoint> {
    check_scale(scale)?;
    Ok(ModelPoint::new(point.x as f64 * scale, point.y as f64 * scale))
}
