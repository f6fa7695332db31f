//! Rate-limited, resized, JPEG-encoded desktop capture.
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use tokio::sync::Mutex;

use crate::config::{clamp_scale_factor, SharedSettings};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::ScreenSize;
use crate::perception::traits::ScreenSource;
use crate::perception::types::{ScreenshotArtifact, ScreenshotMeta};

pub struct ScreenCapture {
    source: Arc<dyn ScreenSource>,
    settings: SharedSettings,
    min_interval: Duration,
    /// Completion time of the previous capture. Held for the whole capture so
    /// concurrent callers are serialised.
    last_capture: Mutex<Option<Instant>>,
}

impl ScreenCapture {
    pub fn new(source: Arc<dyn ScreenSource>, settings: SharedSettings, min_interval: Duration) -> Self {
        Self {
            source,
            settings,
            min_interval,
            last_capture: Mutex::new(None),
        }
    }

    /// Captures the desktop, waiting out the remainder of the minimum interval if the
    /// previous capture was too recent.
    pub async fn capture(&self) -> DeskPilotResult<ScreenshotArtifact> {
        let mut last = self.last_capture.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                tracing::debug!(wait_ms = remaining.as_millis() as u64, "capture throttled");
                tokio::time::sleep(remaining).await;
            }
        }

        let settings = self.settings.snapshot();
        let scale = clamp_scale_factor(settings.scale_factor)?;
        let quality = settings.encode_quality.clamp(1, 100);
        let source = Arc::clone(&self.source);

        let result = tokio::task::spawn_blocking(move || {
            let native = source.capture_native()?;
            encode_capture(native, scale, quality)
        })
        .await
        .map_err(|e| DeskPilotError::Capture(format!("capture task failed: {e}")))
        .and_then(|r| r);

        *last = Some(Instant::now());

        match &result {
            Ok(shot) => tracing::info!(
                resolution = %shot.resolution(),
                native = %format!("{}x{}", shot.meta.native.width, shot.meta.native.height),
                scale = shot.meta.scale_factor,
                size_kb = shot.byte_size() as f64 / 1024.0,
                "screenshot captured"
            ),
            Err(e) => tracing::error!(error = %e, "screenshot failed"),
        }
        result
    }
}

/// Resizes a native capture by `scale` (skipped at 1.0) and encodes it as JPEG.
pub fn encode_capture(
    native: image::RgbaImage,
    scale: f64,
    quality: u8,
) -> DeskPilotResult<ScreenshotArtifact> {
    let native_size = ScreenSize::new(native.width(), native.height());
    if native_size.width == 0 || native_size.height == 0 {
        return Err(DeskPilotError::Capture("display returned an empty image".into()));
    }

    let resized = if scale >= 1.0 {
        native
    } else {
        let target = native_size.scaled(scale);
        image::imageops::resize(&native, target.width, target.height, FilterType::Lanczos3)
    };
    let encoded_size = ScreenSize::new(resized.width(), resized.height());

    // JPEG has no alpha channel.
    let rgb = image::DynamicImage::ImageRgba8(resized).to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| DeskPilotError::Capture(format!("jpeg encoding failed: {e}")))?;

    Ok(ScreenshotArtifact {
        jpeg: buffer.into_inner(),
        meta: ScreenshotMeta {
            scale_factor: scale,
            native: native_size,
            encoded: encoded_size,
        },
        captured_at: chrono::Utc::now(),
    })
}
