use std::sync::Arc;

use kurbo::Point;

use crate::{
    error::{AquamarkError, AquamarkResult},
    media::VideoSourceInfo,
    raster::Pixmap,
};

/// Editor viewport dimensions. Recomputed on layout/resize, never persisted;
/// every consumer re-derives the surface->native ratio at the moment of use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceGeometry {
    pub width: f64,
    pub height: f64,
}

impl SurfaceGeometry {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// True pixel dimensions of the uploaded media.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Decoded pixel source for a media asset. Owned by the host; the engine only reads it.
#[derive(Clone, Debug)]
pub enum MediaSource {
    Image(Arc<Pixmap>),
    Video(Arc<VideoSourceInfo>),
}

#[derive(Clone, Debug)]
pub struct MediaAsset {
    pub kind: MediaKind,
    pub native: NativeSize,
    pub duration_secs: Option<f64>,
    pub source: MediaSource,
}

impl MediaAsset {
    pub fn from_image(pixmap: Pixmap) -> Self {
        let native = NativeSize {
            width: pixmap.width,
            height: pixmap.height,
        };
        Self {
            kind: MediaKind::Image,
            native,
            duration_secs: None,
            source: MediaSource::Image(Arc::new(pixmap)),
        }
    }

    pub fn from_video(info: VideoSourceInfo) -> Self {
        let native = NativeSize {
            width: info.width,
            height: info.height,
        };
        Self {
            kind: MediaKind::Video,
            native,
            duration_secs: Some(info.duration_sec),
            source: MediaSource::Video(Arc::new(info)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    Text,
    Image,
}

/// The working copy of a watermark configuration. Mutated continuously by the
/// drag controller (`anchor`) and by host-level controls (everything else).
#[derive(Clone, Debug)]
pub struct WatermarkSpec {
    pub kind: WatermarkKind,
    pub text: Option<String>,
    pub image: Option<Arc<Pixmap>>,
    pub opacity_percent: f64,
    pub scale_percent: f64,
    pub rotation_degrees: f64,
    /// Center point of the watermark, in *current* editor-surface coordinates.
    pub anchor: Point,
}

impl WatermarkSpec {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: WatermarkKind::Text,
            text: Some(content.into()),
            image: None,
            opacity_percent: 70.0,
            scale_percent: 50.0,
            rotation_degrees: 0.0,
            anchor: Point::ZERO,
        }
    }

    pub fn image(pixmap: Arc<Pixmap>) -> Self {
        Self {
            kind: WatermarkKind::Image,
            text: None,
            image: Some(pixmap),
            opacity_percent: 70.0,
            scale_percent: 50.0,
            rotation_degrees: 0.0,
            anchor: Point::ZERO,
        }
    }

    /// Multiplicative scale factor derived from `scale_percent`.
    pub fn scale_factor(&self) -> f64 {
        self.scale_percent / 100.0
    }

    pub fn opacity(&self) -> f64 {
        self.opacity_percent / 100.0
    }

    pub fn validate(&self) -> AquamarkResult<()> {
        if !(0.0..=100.0).contains(&self.opacity_percent) {
            return Err(AquamarkError::validation(
                "opacity_percent must be within 0..=100",
            ));
        }
        // Scale has a lower bound only; hosts may zoom past 100%.
        if !self.scale_percent.is_finite() || self.scale_percent < 10.0 {
            return Err(AquamarkError::validation("scale_percent must be >= 10"));
        }
        if !(0.0..=360.0).contains(&self.rotation_degrees) {
            return Err(AquamarkError::validation(
                "rotation_degrees must be within 0..=360",
            ));
        }
        match self.kind {
            WatermarkKind::Text => {
                if self.text.as_deref().is_none_or(|t| t.trim().is_empty()) {
                    return Err(AquamarkError::validation(
                        "text watermark requires non-empty text content",
                    ));
                }
            }
            WatermarkKind::Image => {
                if self.image.is_none() {
                    return Err(AquamarkError::validation(
                        "image watermark requires decoded image pixels",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A finished export: the bytes plus the name/mime the host should hand to the user.
#[derive(Clone, Debug)]
pub struct NamedBinary {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}
