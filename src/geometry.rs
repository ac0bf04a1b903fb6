use kurbo::{Affine, Point, Rect, Vec2};

use crate::{
    error::{AquamarkError, AquamarkResult},
    model::{NativeSize, SurfaceGeometry, WatermarkSpec},
};

/// Per-axis ratio between native media pixels and editor-surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalePair {
    pub x: f64,
    pub y: f64,
}

impl ScalePair {
    /// Uniform factor used for image watermark footprints so a square logo
    /// stays square when the native aspect ratio differs from the surface's.
    pub fn uniform(self) -> f64 {
        (self.x + self.y) / 2.0
    }
}

/// Ratio between native resolution and the editor surface, at the moment of use.
/// Never cache the result across a resize.
pub fn surface_to_native_scale(
    surface: SurfaceGeometry,
    native: NativeSize,
) -> AquamarkResult<ScalePair> {
    if surface.is_degenerate() {
        return Err(AquamarkError::degenerate_surface(format!(
            "surface {}x{} has no area",
            surface.width, surface.height
        )));
    }
    Ok(ScalePair {
        x: f64::from(native.width) / surface.width,
        y: f64::from(native.height) / surface.height,
    })
}

/// Placement transform for the watermark layer. The transform origin is the
/// watermark's own center, so the anchor behaves as a point rather than a
/// bounding-box corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WatermarkTransform {
    pub translate: Vec2,
    pub rotate_deg: f64,
    pub scale_factor: f64,
}

pub fn compute_watermark_transform(spec: &WatermarkSpec) -> WatermarkTransform {
    WatermarkTransform {
        translate: spec.anchor.to_vec2(),
        rotate_deg: spec.rotation_degrees,
        scale_factor: spec.scale_factor(),
    }
}

impl WatermarkTransform {
    /// Translate-then-rotate affine about the anchor. Scale is applied per
    /// watermark kind at stamp time (text and image derive their footprints
    /// differently from `scale_factor`).
    pub fn to_affine(self) -> Affine {
        Affine::translate(self.translate) * Affine::rotate(self.rotate_deg.to_radians())
    }
}

/// The nine named placement presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PresetPosition {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Fixed edge insets; constant rather than proportional so margins look
/// consistent regardless of surface size.
const INSET_X: f64 = 70.0;
const INSET_Y: f64 = 50.0;

impl PresetPosition {
    pub const ALL: [PresetPosition; 9] = [
        PresetPosition::TopLeft,
        PresetPosition::TopCenter,
        PresetPosition::TopRight,
        PresetPosition::MiddleLeft,
        PresetPosition::Center,
        PresetPosition::MiddleRight,
        PresetPosition::BottomLeft,
        PresetPosition::BottomCenter,
        PresetPosition::BottomRight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PresetPosition::TopLeft => "Top Left",
            PresetPosition::TopCenter => "Top Center",
            PresetPosition::TopRight => "Top Right",
            PresetPosition::MiddleLeft => "Middle Left",
            PresetPosition::Center => "Center",
            PresetPosition::MiddleRight => "Middle Right",
            PresetPosition::BottomLeft => "Bottom Left",
            PresetPosition::BottomCenter => "Bottom Center",
            PresetPosition::BottomRight => "Bottom Right",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }
}

/// Anchor coordinates for a named preset on the given surface.
pub fn preset_anchor(position: PresetPosition, surface: SurfaceGeometry) -> Point {
    let (w, h) = (surface.width, surface.height);
    let x = match position {
        PresetPosition::TopLeft | PresetPosition::MiddleLeft | PresetPosition::BottomLeft => {
            INSET_X
        }
        PresetPosition::TopCenter | PresetPosition::Center | PresetPosition::BottomCenter => {
            w / 2.0
        }
        PresetPosition::TopRight | PresetPosition::MiddleRight | PresetPosition::BottomRight => {
            w - INSET_X
        }
    };
    let y = match position {
        PresetPosition::TopLeft | PresetPosition::TopCenter | PresetPosition::TopRight => INSET_Y,
        PresetPosition::MiddleLeft | PresetPosition::Center | PresetPosition::MiddleRight => {
            h / 2.0
        }
        PresetPosition::BottomLeft | PresetPosition::BottomCenter | PresetPosition::BottomRight => {
            h - INSET_Y
        }
    };
    Point::new(x, y)
}

/// "Contain" fit of the native media inside the surface: scaled to the larger
/// dimension that still fits, centered on both axes.
pub fn contain_fit(native: NativeSize, surface: SurfaceGeometry) -> Rect {
    if surface.is_degenerate() || native.width == 0 || native.height == 0 {
        return Rect::ZERO;
    }
    let (nw, nh) = (f64::from(native.width), f64::from(native.height));
    let s = (surface.width / nw).min(surface.height / nh);
    let (w, h) = (nw * s, nh * s);
    let x0 = (surface.width - w) / 2.0;
    let y0 = (surface.height - h) / 2.0;
    Rect::new(x0, y0, x0 + w, y0 + h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_is_plain_ratio() {
        let s = surface_to_native_scale(
            SurfaceGeometry::new(800.0, 600.0),
            NativeSize {
                width: 1600,
                height: 1200,
            },
        )
        .unwrap();
        assert_eq!(s.x, 2.0);
        assert_eq!(s.y, 2.0);
    }

    #[test]
    fn zero_area_surface_is_degenerate() {
        let err = surface_to_native_scale(
            SurfaceGeometry::new(0.0, 600.0),
            NativeSize {
                width: 100,
                height: 100,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AquamarkError::DegenerateSurface(_)));
    }

    #[test]
    fn transform_centers_on_anchor() {
        let mut spec = WatermarkSpec::text("x");
        spec.anchor = Point::new(400.0, 300.0);
        spec.scale_percent = 50.0;
        spec.rotation_degrees = 0.0;
        let t = compute_watermark_transform(&spec);
        assert_eq!(t.translate, Vec2::new(400.0, 300.0));
        assert_eq!(t.scale_factor, 0.5);
        let p = t.to_affine() * Point::ZERO;
        assert_eq!(p, Point::new(400.0, 300.0));
    }

    #[test]
    fn rotation_passes_through_unchanged() {
        let mut spec = WatermarkSpec::text("x");
        spec.rotation_degrees = 135.0;
        assert_eq!(compute_watermark_transform(&spec).rotate_deg, 135.0);
    }

    #[test]
    fn center_preset_is_exact_midpoint() {
        for (w, h) in [(800.0, 600.0), (333.0, 777.0), (1.0, 1.0)] {
            let p = preset_anchor(PresetPosition::Center, SurfaceGeometry::new(w, h));
            assert_eq!(p, Point::new(w / 2.0, h / 2.0));
        }
    }

    #[test]
    fn corner_presets_use_fixed_insets() {
        let surface = SurfaceGeometry::new(800.0, 600.0);
        assert_eq!(
            preset_anchor(PresetPosition::TopLeft, surface),
            Point::new(70.0, 50.0)
        );
        assert_eq!(
            preset_anchor(PresetPosition::BottomRight, surface),
            Point::new(730.0, 550.0)
        );
        assert_eq!(
            preset_anchor(PresetPosition::MiddleRight, surface),
            Point::new(730.0, 300.0)
        );
    }

    #[test]
    fn preset_labels_round_trip() {
        for p in PresetPosition::ALL {
            assert_eq!(PresetPosition::from_label(p.label()), Some(p));
        }
        assert_eq!(PresetPosition::from_label("nowhere"), None);
    }

    #[test]
    fn contain_fit_letterboxes_wide_media() {
        let r = contain_fit(
            NativeSize {
                width: 200,
                height: 100,
            },
            SurfaceGeometry::new(100.0, 100.0),
        );
        assert_eq!(r, Rect::new(0.0, 25.0, 100.0, 75.0));
    }

    #[test]
    fn uniform_scale_is_axis_average() {
        let s = ScalePair { x: 2.0, y: 4.0 };
        assert_eq!(s.uniform(), 3.0);
    }
}
