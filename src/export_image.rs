use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    error::{AquamarkError, AquamarkResult},
    model::{MediaAsset, MediaKind, MediaSource, NamedBinary, SurfaceGeometry, WatermarkSpec},
    raster::Pixmap,
    text::WatermarkFont,
    watermark::{prepare_watermark, stamp_watermark},
};

pub(crate) fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Encode a straight-alpha copy of the canvas as PNG.
pub(crate) fn encode_png(canvas: &Pixmap) -> AquamarkResult<Vec<u8>> {
    let raw = canvas.to_rgba8_straight();
    let img = image::RgbaImage::from_raw(canvas.width, canvas.height, raw)
        .ok_or_else(|| AquamarkError::export_failed("canvas buffer size mismatch"))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| AquamarkError::export_failed(format!("png encode: {e}")))?;
    Ok(bytes)
}

/// Bake the watermark into the image at its native resolution and return the
/// PNG. The canvas matches the media's true pixel dimensions, never the
/// preview's; the watermark goes through the shared stamping policy so the
/// output matches what the editor showed. Nothing partial is ever returned.
#[tracing::instrument(skip_all, fields(native_w = asset.native.width, native_h = asset.native.height))]
pub fn export_image(
    asset: &MediaAsset,
    spec: &WatermarkSpec,
    surface: SurfaceGeometry,
    font: Option<&WatermarkFont>,
) -> AquamarkResult<NamedBinary> {
    if asset.kind != MediaKind::Image {
        return Err(AquamarkError::export_failed(
            "image export requires an image asset",
        ));
    }
    let MediaSource::Image(base) = &asset.source else {
        return Err(AquamarkError::export_failed(
            "image asset carries no decoded pixels",
        ));
    };
    let prepared = prepare_watermark(spec, font)?;
    let mut canvas = Pixmap::new(asset.native.width, asset.native.height);
    canvas.stamp_affine(base, kurbo::Affine::IDENTITY, 1.0);
    stamp_watermark(&mut canvas, &prepared, spec, surface, asset.native)?;

    Ok(NamedBinary {
        filename: format!("watermarked-{}.png", unix_millis()),
        mime_type: "image/png".to_owned(),
        data: encode_png(&canvas)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kurbo::Point;

    fn solid_asset(w: u32, h: u32, px: [u8; 4]) -> MediaAsset {
        let mut data = Vec::with_capacity(w as usize * h as usize * 4);
        for _ in 0..w * h {
            data.extend_from_slice(&px);
        }
        MediaAsset::from_image(Pixmap::from_rgba8_premul(w, h, data))
    }

    fn logo_spec() -> WatermarkSpec {
        let logo = Pixmap::from_rgba8_premul(8, 8, vec![255; 8 * 8 * 4]);
        WatermarkSpec::image(Arc::new(logo))
    }

    #[test]
    fn output_is_png_at_native_resolution() {
        let asset = solid_asset(64, 32, [0, 0, 255, 255]);
        let mut spec = logo_spec();
        spec.anchor = Point::new(16.0, 8.0);
        let out = export_image(&asset, &spec, SurfaceGeometry::new(32.0, 16.0), None).unwrap();
        assert_eq!(out.mime_type, "image/png");
        assert!(out.filename.starts_with("watermarked-"));
        assert!(out.filename.ends_with(".png"));
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[test]
    fn watermark_lands_at_scaled_anchor() {
        // Surface is half the native size on both axes.
        let asset = solid_asset(200, 100, [0, 0, 0, 255]);
        let mut spec = logo_spec();
        spec.anchor = Point::new(50.0, 25.0);
        spec.opacity_percent = 100.0;
        spec.scale_percent = 10.0;
        let out = export_image(&asset, &spec, SurfaceGeometry::new(100.0, 50.0), None).unwrap();
        let decoded = image::load_from_memory(&out.data).unwrap().to_rgba8();
        // Anchor maps to native (100, 50); logo is pure white there.
        assert_eq!(decoded.get_pixel(100, 50).0, [255, 255, 255, 255]);
        // Away from the footprint the base is untouched.
        assert_eq!(decoded.get_pixel(5, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn degenerate_surface_fails_without_partial_output() {
        let asset = solid_asset(10, 10, [0, 0, 0, 255]);
        let spec = logo_spec();
        let err =
            export_image(&asset, &spec, SurfaceGeometry::new(0.0, 0.0), None).unwrap_err();
        assert!(matches!(err, AquamarkError::DegenerateSurface(_)));
    }

    #[test]
    fn video_asset_is_rejected() {
        use crate::media::VideoSourceInfo;
        let asset = MediaAsset::from_video(VideoSourceInfo {
            path: "clip.mp4".into(),
            width: 10,
            height: 10,
            duration_sec: 1.0,
            fps: 30.0,
        });
        let spec = logo_spec();
        let err =
            export_image(&asset, &spec, SurfaceGeometry::new(10.0, 10.0), None).unwrap_err();
        assert!(matches!(err, AquamarkError::ExportFailed(_)));
    }

    #[test]
    fn invalid_spec_is_rejected_before_drawing() {
        let asset = solid_asset(10, 10, [0, 0, 0, 255]);
        let mut spec = logo_spec();
        spec.opacity_percent = 150.0;
        let err =
            export_image(&asset, &spec, SurfaceGeometry::new(10.0, 10.0), None).unwrap_err();
        assert!(matches!(err, AquamarkError::Validation(_)));
    }
}
