//! Separable gaussian blur over premultiplied RGBA8, used for the text
//! watermark's drop shadow.

/// Q16 fixed-point gaussian kernel, normalized to sum to 65536.
fn kernel_q16(sigma: f64) -> Vec<u32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as i64;
    let mut weights = Vec::with_capacity((2 * radius + 1) as usize);
    let denom = 2.0 * sigma * sigma;
    for i in -radius..=radius {
        let x = i as f64;
        weights.push((-x * x / denom).exp());
    }
    let sum: f64 = weights.iter().sum();
    let mut fixed: Vec<u32> = weights
        .iter()
        .map(|w| ((w / sum) * 65536.0).round() as u32)
        .collect();
    // Push rounding residue into the center tap so the kernel sums exactly.
    let total: i64 = fixed.iter().map(|&w| i64::from(w)).sum();
    let center = fixed.len() / 2;
    fixed[center] = (i64::from(fixed[center]) + 65536 - total).max(0) as u32;
    fixed
}

fn pass(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    kernel: &[u32],
    horizontal: bool,
) {
    let radius = (kernel.len() / 2) as i64;
    let (outer, inner) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };
    for o in 0..outer {
        for i in 0..inner {
            let mut acc = [0u64; 4];
            for (k, &w) in kernel.iter().enumerate() {
                let s = (i as i64 + k as i64 - radius).clamp(0, inner as i64 - 1) as usize;
                let idx = if horizontal {
                    (o * width + s) * 4
                } else {
                    (s * width + o) * 4
                };
                for c in 0..4 {
                    acc[c] += u64::from(src[idx + c]) * u64::from(w);
                }
            }
            let idx = if horizontal {
                (o * width + i) * 4
            } else {
                (i * width + o) * 4
            };
            for c in 0..4 {
                dst[idx + c] = ((acc[c] + 32768) >> 16).min(255) as u8;
            }
        }
    }
}

/// Blur `pixels` (premultiplied RGBA8, row-major) in place. Edge pixels clamp.
pub fn gaussian_blur_premul(pixels: &mut [u8], width: usize, height: usize, sigma: f64) {
    if sigma <= 0.0 || width == 0 || height == 0 {
        return;
    }
    debug_assert_eq!(pixels.len(), width * height * 4);
    let kernel = kernel_q16(sigma);
    let mut scratch = vec![0u8; pixels.len()];
    pass(pixels, &mut scratch, width, height, &kernel, true);
    pass(&scratch, pixels, width, height, &kernel, false);
}
