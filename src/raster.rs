use kurbo::{Affine, Point, Rect};

use crate::composite::{over_premul, premultiply_rgba8, scale_premul, unpremultiply_rgba8};

/// CPU pixel surface: RGBA8, premultiplied alpha, row-major.
#[derive(Clone, Debug)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Pixmap {
    /// Transparent surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Wrap a straight-alpha RGBA8 buffer, premultiplying in place.
    pub fn from_rgba8_straight(width: u32, height: u32, mut data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        premultiply_rgba8(&mut data);
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap a buffer that is already premultiplied.
    pub fn from_rgba8_premul(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            data,
        }
    }

    /// Copy out as straight-alpha RGBA8 for encoders.
    pub fn to_rgba8_straight(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        unpremultiply_rgba8(&mut out);
        out
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    fn put_over(&mut self, x: u32, y: u32, src: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let dst = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
        let out = over_premul(src, dst);
        self.data[i..i + 4].copy_from_slice(&out);
    }

    /// Bilinear sample at sprite-space coordinates, premultiplied; reads
    /// outside the sprite are transparent.
    fn sample_bilinear(&self, x: f64, y: f64) -> [u8; 4] {
        let fetch = |ix: i64, iy: i64| -> [f64; 4] {
            if ix < 0 || iy < 0 || ix >= i64::from(self.width) || iy >= i64::from(self.height) {
                return [0.0; 4];
            }
            let p = self.pixel(ix as u32, iy as u32);
            [f64::from(p[0]), f64::from(p[1]), f64::from(p[2]), f64::from(p[3])]
        };
        let x0 = (x - 0.5).floor();
        let y0 = (y - 0.5).floor();
        let fx = x - 0.5 - x0;
        let fy = y - 0.5 - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);
        let p00 = fetch(x0, y0);
        let p10 = fetch(x0 + 1, y0);
        let p01 = fetch(x0, y0 + 1);
        let p11 = fetch(x0 + 1, y0 + 1);
        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = p00[c] * (1.0 - fx) + p10[c] * fx;
            let bot = p01[c] * (1.0 - fx) + p11[c] * fx;
            out[c] = (top * (1.0 - fy) + bot * fy + 0.5).min(255.0) as u8;
        }
        out
    }

    /// Composite `sprite` onto `self` through `transform` (sprite pixel
    /// coordinates -> destination pixel coordinates), scaling coverage by
    /// `opacity`. Destination pixels are walked over the transformed bounding
    /// box and sampled through the inverse map, so rotation and non-integer
    /// placement stay smooth. A non-invertible transform stamps nothing.
    pub fn stamp_affine(&mut self, sprite: &Pixmap, transform: Affine, opacity: f64) {
        let det = transform.determinant();
        if det.abs() < 1e-12 || opacity <= 0.0 {
            return;
        }
        let inv = transform.inverse();
        let sprite_rect = Rect::new(0.0, 0.0, f64::from(sprite.width), f64::from(sprite.height));
        let bbox = transform.transform_rect_bbox(sprite_rect);
        let x_min = bbox.x0.floor().max(0.0) as u32;
        let y_min = bbox.y0.floor().max(0.0) as u32;
        let x_max = (bbox.x1.ceil() as i64).clamp(0, i64::from(self.width)) as u32;
        let y_max = (bbox.y1.ceil() as i64).clamp(0, i64::from(self.height)) as u32;
        for y in y_min..y_max {
            for x in x_min..x_max {
                let src_pt = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if src_pt.x < -1.0
                    || src_pt.y < -1.0
                    || src_pt.x > f64::from(sprite.width) + 1.0
                    || src_pt.y > f64::from(sprite.height) + 1.0
                {
                    continue;
                }
                let sampled = sprite.sample_bilinear(src_pt.x, src_pt.y);
                if sampled[3] == 0 {
                    continue;
                }
                self.put_over(x, y, scale_premul(sampled, opacity));
            }
        }
    }
}
