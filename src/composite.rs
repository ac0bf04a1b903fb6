//! Premultiplied-alpha pixel arithmetic shared by the rasterizer and exporters.
//!
//! All buffers in this crate are RGBA8 with premultiplied alpha; conversion to
//! straight alpha happens only at the encode boundary.

/// (a * b) / 255 with correct rounding.
#[inline]
pub fn mul_div255(a: u32, b: u32) -> u32 {
    let t = a * b + 128;
    (t + (t >> 8)) >> 8
}

/// Source-over for one premultiplied RGBA8 pixel: `src + dst * (1 - src.a)`.
#[inline]
pub fn over_premul(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let inv_a = 255 - u32::from(src[3]);
    [
        (u32::from(src[0]) + mul_div255(u32::from(dst[0]), inv_a)) as u8,
        (u32::from(src[1]) + mul_div255(u32::from(dst[1]), inv_a)) as u8,
        (u32::from(src[2]) + mul_div255(u32::from(dst[2]), inv_a)) as u8,
        (u32::from(src[3]) + mul_div255(u32::from(dst[3]), inv_a)) as u8,
    ]
}

/// Straight -> premultiplied, in place over an interleaved RGBA8 buffer.
pub fn premultiply_rgba8(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        if a == 255 {
            continue;
        }
        px[0] = mul_div255(u32::from(px[0]), a) as u8;
        px[1] = mul_div255(u32::from(px[1]), a) as u8;
        px[2] = mul_div255(u32::from(px[2]), a) as u8;
    }
}

/// Premultiplied -> straight, in place. Fully transparent pixels zero out.
pub fn unpremultiply_rgba8(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        match a {
            0 => {
                px[0] = 0;
                px[1] = 0;
                px[2] = 0;
            }
            255 => {}
            _ => {
                px[0] = ((u32::from(px[0]) * 255 + a / 2) / a).min(255) as u8;
                px[1] = ((u32::from(px[1]) * 255 + a / 2) / a).min(255) as u8;
                px[2] = ((u32::from(px[2]) * 255 + a / 2) / a).min(255) as u8;
            }
        }
    }
}

/// Scale a premultiplied pixel by a [0, 1] coverage/opacity factor.
#[inline]
pub fn scale_premul(px: [u8; 4], factor: f64) -> [u8; 4] {
    let f = (factor.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
    [
        mul_div255(u32::from(px[0]), f) as u8,
        mul_div255(u32::from(px[1]), f) as u8,
        mul_div255(u32::from(px[2]), f) as u8,
        mul_div255(u32::from(px[3]), f) as u8,
    ]
}
