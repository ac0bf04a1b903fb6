use std::sync::Arc;

use kurbo::{Affine, Vec2};

use crate::{
    error::{AquamarkError, AquamarkResult},
    geometry::{compute_watermark_transform, surface_to_native_scale},
    model::{NativeSize, SurfaceGeometry, WatermarkKind, WatermarkSpec},
    raster::Pixmap,
    text::{WatermarkFont, font_size_px},
};

/// Surface-pixel width floor and base for image watermarks.
const IMAGE_BASE_WIDTH: f64 = 200.0;
const IMAGE_MIN_WIDTH: f64 = 50.0;

/// A watermark resolved to pixels, ready to stamp any number of times.
/// Pre-rendering happens once per export so per-frame work is a single
/// affine stamp.
#[derive(Debug)]
pub enum PreparedWatermark {
    Text(Pixmap),
    Image {
        pixmap: Arc<Pixmap>,
        natural_width: u32,
        natural_height: u32,
    },
}

/// Validate the spec and resolve it to a stampable sprite. Text watermarks
/// need `font`; image watermarks ignore it.
pub fn prepare_watermark(
    spec: &WatermarkSpec,
    font: Option<&WatermarkFont>,
) -> AquamarkResult<PreparedWatermark> {
    spec.validate()?;
    match spec.kind {
        WatermarkKind::Text => {
            let font = font
                .ok_or_else(|| AquamarkError::validation("text watermark requires a font"))?;
            let text = spec
                .text
                .as_deref()
                .ok_or_else(|| AquamarkError::validation("text watermark has no content"))?;
            let sprite = font.render_text_sprite(text, font_size_px(spec.scale_percent));
            Ok(PreparedWatermark::Text(sprite))
        }
        WatermarkKind::Image => {
            let pixmap = spec
                .image
                .clone()
                .ok_or_else(|| AquamarkError::validation("image watermark has no pixels"))?;
            Ok(PreparedWatermark::Image {
                natural_width: pixmap.width,
                natural_height: pixmap.height,
                pixmap,
            })
        }
    }
}

/// Image watermark footprint in surface pixels: width from the scale slider
/// with a legibility floor, height from the natural aspect ratio (falling
/// back to square when the natural height is unknown or zero).
pub fn image_footprint_surface(
    spec: &WatermarkSpec,
    natural_width: u32,
    natural_height: u32,
) -> (f64, f64) {
    let width = (IMAGE_BASE_WIDTH * spec.scale_factor()).max(IMAGE_MIN_WIDTH);
    let aspect = if natural_height == 0 {
        1.0
    } else {
        f64::from(natural_width) / f64::from(natural_height)
    };
    let aspect = if aspect > 0.0 && aspect.is_finite() {
        aspect
    } else {
        1.0
    };
    (width, width / aspect)
}

/// Stamp a prepared watermark onto a native-resolution canvas. Both exporters
/// go through here, so the live preview, the PNG and every video frame agree
/// on placement, rotation, scale and opacity.
pub fn stamp_watermark(
    canvas: &mut Pixmap,
    prepared: &PreparedWatermark,
    spec: &WatermarkSpec,
    surface: SurfaceGeometry,
    native: NativeSize,
) -> AquamarkResult<()> {
    let scale = surface_to_native_scale(surface, native)?;
    let transform = compute_watermark_transform(spec);

    // Anchor converts from surface space to native pixels per axis.
    let anchor_native = Vec2::new(
        transform.translate.x * scale.x,
        transform.translate.y * scale.y,
    );
    let rotate = Affine::rotate(transform.rotate_deg.to_radians());

    let (sprite, sx, sy) = match prepared {
        PreparedWatermark::Text(sprite) => {
            // The sprite's font size carries the legibility floor; the scale
            // slider applies again here, on top of the surface->native ratio.
            // The x ratio on both axes keeps the glyph aspect.
            let s = transform.scale_factor * scale.x;
            (sprite, s, s)
        }
        PreparedWatermark::Image {
            pixmap,
            natural_width,
            natural_height,
        } => {
            let (w_surface, h_surface) =
                image_footprint_surface(spec, *natural_width, *natural_height);
            let uniform = scale.uniform();
            let target_w = w_surface * uniform;
            let target_h = h_surface * uniform;
            (
                pixmap.as_ref(),
                target_w / f64::from(pixmap.width.max(1)),
                target_h / f64::from(pixmap.height.max(1)),
            )
        }
    };

    let center_sprite = Affine::translate(Vec2::new(
        -f64::from(sprite.width) / 2.0,
        -f64::from(sprite.height) / 2.0,
    ));
    let affine = Affine::translate(anchor_native)
        * rotate
        * Affine::scale_non_uniform(sx, sy)
        * center_sprite;
    canvas.stamp_affine(sprite, affine, spec.opacity());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    fn image_spec(w: u32, h: u32) -> WatermarkSpec {
        let sprite = Pixmap::from_rgba8_premul(w, h, vec![255; w as usize * h as usize * 4]);
        WatermarkSpec::image(Arc::new(sprite))
    }

    #[test]
    fn footprint_scales_from_base_width() {
        let spec = image_spec(100, 100);
        // scale 50% of the 200px base, square natural size.
        assert_eq!(image_footprint_surface(&spec, 100, 100), (100.0, 100.0));
    }

    #[test]
    fn footprint_has_width_floor() {
        let mut spec = image_spec(100, 100);
        spec.scale_percent = 10.0;
        assert_eq!(image_footprint_surface(&spec, 100, 100), (50.0, 50.0));
    }

    #[test]
    fn footprint_preserves_aspect_ratio() {
        let mut spec = image_spec(300, 150);
        spec.scale_percent = 100.0;
        let (w, h) = image_footprint_surface(&spec, 300, 150);
        assert_eq!(w, 200.0);
        assert_eq!(h, 100.0);
    }

    #[test]
    fn zero_natural_height_falls_back_to_square() {
        let spec = image_spec(100, 100);
        let (w, h) = image_footprint_surface(&spec, 300, 0);
        assert_eq!(w, h);
    }

    #[test]
    fn prepare_rejects_text_without_font() {
        let spec = WatermarkSpec::text("hi");
        assert!(prepare_watermark(&spec, None).is_err());
    }

    #[test]
    fn prepare_image_carries_natural_size() {
        let spec = image_spec(30, 20);
        match prepare_watermark(&spec, None).unwrap() {
            PreparedWatermark::Image {
                natural_width,
                natural_height,
                ..
            } => {
                assert_eq!((natural_width, natural_height), (30, 20));
            }
            other => panic!("expected image watermark, got {other:?}"),
        }
    }

    #[test]
    fn stamp_centers_on_scaled_anchor() {
        // 100x50 surface over 200x100 native: scale 2x both axes.
        let surface = SurfaceGeometry::new(100.0, 50.0);
        let native = NativeSize {
            width: 200,
            height: 100,
        };
        let mut spec = image_spec(10, 10);
        spec.anchor = Point::new(50.0, 25.0);
        spec.opacity_percent = 100.0;
        // Keep the footprint at the 50px floor so the far corner stays clear.
        spec.scale_percent = 10.0;
        let prepared = prepare_watermark(&spec, None).unwrap();
        let mut canvas = Pixmap::new(200, 100);
        stamp_watermark(&mut canvas, &prepared, &spec, surface, native).unwrap();
        // Anchor (50, 25) maps to native (100, 50); the watermark is opaque there.
        assert_eq!(canvas.pixel(100, 50)[3], 255);
        // Far corner stays untouched.
        assert_eq!(canvas.pixel(5, 5)[3], 0);
    }

    #[test]
    fn text_stamp_width_follows_scale_factor() {
        // A synthetic all-ink sprite stands in for rendered text so the
        // footprint can be measured exactly.
        let sprite = Pixmap::from_rgba8_premul(40, 10, vec![255; 40 * 10 * 4]);
        let prepared = PreparedWatermark::Text(sprite);
        let surface = SurfaceGeometry::new(100.0, 100.0);
        let native = NativeSize {
            width: 100,
            height: 100,
        };
        let mut spec = WatermarkSpec::text("stub");
        spec.anchor = Point::new(50.0, 50.0);
        spec.opacity_percent = 100.0;

        // At 50% the stamped footprint is half the sprite: 20px about the anchor.
        spec.scale_percent = 50.0;
        let mut canvas = Pixmap::new(100, 100);
        stamp_watermark(&mut canvas, &prepared, &spec, surface, native).unwrap();
        assert_eq!(canvas.pixel(50, 50)[3], 255);
        assert_eq!(canvas.pixel(41, 50)[3], 255);
        assert_eq!(canvas.pixel(58, 50)[3], 255);
        assert_eq!(canvas.pixel(37, 50)[3], 0);
        assert_eq!(canvas.pixel(63, 50)[3], 0);

        // At 100% the same sprite covers the full 40px.
        spec.scale_percent = 100.0;
        let mut canvas = Pixmap::new(100, 100);
        stamp_watermark(&mut canvas, &prepared, &spec, surface, native).unwrap();
        assert_eq!(canvas.pixel(31, 50)[3], 255);
        assert_eq!(canvas.pixel(68, 50)[3], 255);
        assert_eq!(canvas.pixel(27, 50)[3], 0);
    }

    #[test]
    fn stamp_applies_opacity() {
        let surface = SurfaceGeometry::new(100.0, 100.0);
        let native = NativeSize {
            width: 100,
            height: 100,
        };
        let mut spec = image_spec(10, 10);
        spec.anchor = Point::new(50.0, 50.0);
        spec.opacity_percent = 50.0;
        let prepared = prepare_watermark(&spec, None).unwrap();
        let mut canvas = Pixmap::new(100, 100);
        stamp_watermark(&mut canvas, &prepared, &spec, surface, native).unwrap();
        let a = canvas.pixel(50, 50)[3];
        assert!((120..=136).contains(&a), "alpha {a}");
    }

    #[test]
    fn stamp_on_degenerate_surface_errors() {
        let spec = image_spec(10, 10);
        let prepared = prepare_watermark(&spec, None).unwrap();
        let mut canvas = Pixmap::new(10, 10);
        let err = stamp_watermark(
            &mut canvas,
            &prepared,
            &spec,
            SurfaceGeometry::new(0.0, 0.0),
            NativeSize {
                width: 10,
                height: 10,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AquamarkError::DegenerateSurface(_)));
    }
}
