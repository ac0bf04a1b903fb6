use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};

use crate::{
    blur::gaussian_blur_premul,
    composite::over_premul,
    error::{AquamarkError, AquamarkResult},
    raster::Pixmap,
};

/// Text watermarks are pre-rendered once at a fixed sprite size and then
/// scaled like an image watermark, so dragging and export never re-shape text.
pub const TEXT_SPRITE_WIDTH: u32 = 1000;
pub const TEXT_SPRITE_HEIGHT: u32 = 200;

/// Base glyph size before scaling, floored so text stays legible at the
/// smallest allowed scale.
pub fn font_size_px(scale_percent: f64) -> f32 {
    (48.0 * scale_percent / 100.0).max(16.0) as f32
}

const SHADOW_OFFSET: (i64, i64) = (2, 2);
const SHADOW_SIGMA: f64 = 2.0;
const SHADOW_ALPHA: f64 = 0.5;

/// An owned font for watermark text.
pub struct WatermarkFont {
    font: FontVec,
}

impl std::fmt::Debug for WatermarkFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkFont").finish_non_exhaustive()
    }
}

impl WatermarkFont {
    pub fn from_bytes(data: Vec<u8>) -> AquamarkResult<Self> {
        let font = FontVec::try_from_vec(data)
            .map_err(|_| AquamarkError::validation("font data could not be parsed"))?;
        Ok(Self { font })
    }

    /// Coverage mask for `text` at `size`, centered in a w x h raster.
    fn draw_mask(&self, text: &str, size: f32, width: u32, height: u32) -> Vec<u8> {
        let scaled = self.font.as_scaled(PxScale::from(size));
        let mut mask = vec![0u8; width as usize * height as usize];

        let mut line_width = 0.0f32;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(p) = prev {
                line_width += scaled.kern(p, id);
            }
            line_width += scaled.h_advance(id);
            prev = Some(id);
        }

        let mut caret_x = (width as f32 - line_width) / 2.0;
        let baseline = height as f32 / 2.0 + (scaled.ascent() + scaled.descent()) / 2.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(p) = prev {
                caret_x += scaled.kern(p, id);
            }
            let glyph = id.with_scale_and_position(PxScale::from(size), point(caret_x, baseline));
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let x = bounds.min.x as i64 + i64::from(gx);
                    let y = bounds.min.y as i64 + i64::from(gy);
                    if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
                        return;
                    }
                    let idx = y as usize * width as usize + x as usize;
                    let c = (coverage.clamp(0.0, 1.0) * 255.0 + 0.5) as u16;
                    mask[idx] = mask[idx].max(c.min(255) as u8);
                });
            }
            caret_x += scaled.h_advance(id);
            prev = Some(id);
        }
        mask
    }

    /// Render `text` as the standard watermark sprite: white glyphs over a
    /// soft black drop shadow, premultiplied, in a fixed 1000x200 raster.
    pub fn render_text_sprite(&self, text: &str, size: f32) -> Pixmap {
        let (w, h) = (TEXT_SPRITE_WIDTH, TEXT_SPRITE_HEIGHT);
        let mask = self.draw_mask(text, size, w, h);

        // Shadow layer: mask at half opacity, offset down-right, blurred.
        let mut shadow = vec![0u8; w as usize * h as usize * 4];
        for y in 0..i64::from(h) {
            for x in 0..i64::from(w) {
                let sx = x - SHADOW_OFFSET.0;
                let sy = y - SHADOW_OFFSET.1;
                if sx < 0 || sy < 0 || sx >= i64::from(w) || sy >= i64::from(h) {
                    continue;
                }
                let cov = mask[sy as usize * w as usize + sx as usize];
                let a = (f64::from(cov) * SHADOW_ALPHA + 0.5) as u8;
                // Premultiplied black: only alpha carries signal.
                shadow[(y as usize * w as usize + x as usize) * 4 + 3] = a;
            }
        }
        gaussian_blur_premul(&mut shadow, w as usize, h as usize, SHADOW_SIGMA);

        let mut sprite = Pixmap::from_rgba8_premul(w, h, shadow);
        for y in 0..h {
            for x in 0..w {
                let cov = mask[y as usize * w as usize + x as usize];
                if cov == 0 {
                    continue;
                }
                let i = (y as usize * w as usize + x as usize) * 4;
                let dst = [
                    sprite.data[i],
                    sprite.data[i + 1],
                    sprite.data[i + 2],
                    sprite.data[i + 3],
                ];
                // Premultiplied white at the mask's coverage.
                let out = over_premul([cov, cov, cov, cov], dst);
                sprite.data[i..i + 4].copy_from_slice(&out);
            }
        }
        sprite
    }
}
