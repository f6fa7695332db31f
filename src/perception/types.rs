use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::executor::coordinator::ScreenSize;

/// Where and how a screenshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    /// Scale factor used for the resize (1.0 = native, no resize).
    pub scale_factor: f64,
    pub native: ScreenSize,
    /// Size of the encoded image, i.e. model space.
    pub encoded: ScreenSize,
}

/// One encoded capture of the desktop. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotArtifact {
    pub jpeg: Vec<u8>,
    pub meta: ScreenshotMeta,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl ScreenshotArtifact {
    pub fn byte_size(&self) -> usize {
        self.jpeg.len()
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.meta.encoded.width, self.meta.encoded.height)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }
}
