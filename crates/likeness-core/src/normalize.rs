//! Crop and resampling geometry feeding the landmark and embedding networks.
//!
//! Two crop policies coexist on purpose. The square detector-input crop
//! zero-pads out-of-bounds regions so its canvas has a fixed geometry that
//! landmark coordinates can be projected back through. The recognition crop
//! clamps to the image without padding, so its aspect may go non-square at
//! image edges.

use crate::rect::{CropRegion, Rect};
use crate::types::{ImageView, Landmarks, Pixmap};

/// Square crop centered on `face`, zero-padded where it leaves the source
/// image, resized to `out_size` x `out_size`. Returns the resized canvas
/// together with the region needed to project canvas coordinates back into
/// image space.
pub fn square_crop(image: &ImageView<'_>, face: &Rect, out_size: usize) -> (Pixmap, CropRegion) {
    let square = face.to_square();
    let region = CropRegion::cover(&square, image.width, image.height);

    let mut canvas = Pixmap::zeroed(region.canvas_w.max(1), region.canvas_h.max(1), image.channels);

    let span = region.src_x1 - region.src_x0;
    let row_bytes = span * image.channels;
    for y in region.src_y0..region.src_y1 {
        let dst_y = region.dst_y0 + (y - region.src_y0);
        let src_off = image.offset(region.src_x0, y);
        let dst_off = (dst_y * canvas.width + region.dst_x0) * canvas.channels;
        canvas.data[dst_off..dst_off + row_bytes]
            .copy_from_slice(&image.data[src_off..src_off + row_bytes]);
    }

    let resized = if out_size >= canvas.width.max(canvas.height) {
        resize_bilinear(&canvas.view(), out_size, out_size)
    } else {
        resize_area(&canvas.view(), out_size, out_size)
    };

    (resized, region)
}

/// Recognition-input crop: bounding box of the five landmarks, expanded by
/// `margin` of its width/height on every side, squared by growing the
/// shorter dimension, clamped to the image without padding, then resized to
/// `out_size` x `out_size` with area resampling.
pub fn recognition_crop(
    image: &ImageView<'_>,
    landmarks: &Landmarks,
    margin: f32,
    out_size: usize,
) -> Pixmap {
    let bbox = landmarks.bounding_rect();
    let w = (bbox.x2 - bbox.x1) as f32;
    let h = (bbox.y2 - bbox.y1) as f32;

    let mut x1 = bbox.x1 as f32 - w * margin;
    let mut x2 = bbox.x2 as f32 + w * margin;
    let mut y1 = bbox.y1 as f32 - h * margin;
    let mut y2 = bbox.y2 as f32 + h * margin;

    // Grow the shorter dimension, centered, until the box is square.
    let ew = x2 - x1;
    let eh = y2 - y1;
    if eh > ew {
        let c = (x1 + x2) * 0.5;
        let half = eh * 0.5;
        x1 = c - half;
        x2 = c + half;
    } else {
        let c = (y1 + y2) * 0.5;
        let half = ew * 0.5;
        y1 = c - half;
        y2 = c + half;
    }

    // Clamp, never pad. Aspect may become non-square at image edges.
    x1 = x1.max(0.0);
    y1 = y1.max(0.0);
    x2 = x2.min(image.width as f32);
    y2 = y2.min(image.height as f32);

    let ix1 = x1 as usize;
    let iy1 = y1 as usize;
    let ix2 = (x2 as usize).min(image.width);
    let iy2 = (y2 as usize).min(image.height);

    if ix2 <= ix1 || iy2 <= iy1 {
        // Degenerate landmark spread; downstream quality gating rejects it.
        return Pixmap::zeroed(out_size, out_size, image.channels);
    }

    let cropped = extract(image, ix1, iy1, ix2, iy2);
    resize_area(&cropped.view(), out_size, out_size)
}

/// Copy the half-open window `[x0, x1) x [y0, y1)` into an owned buffer.
/// The window must be within the image bounds.
fn extract(image: &ImageView<'_>, x0: usize, y0: usize, x1: usize, y1: usize) -> Pixmap {
    let mut out = Pixmap::zeroed(x1 - x0, y1 - y0, image.channels);
    let row_bytes = (x1 - x0) * image.channels;
    for y in y0..y1 {
        let src_off = image.offset(x0, y);
        let dst_off = (y - y0) * row_bytes;
        out.data[dst_off..dst_off + row_bytes]
            .copy_from_slice(&image.data[src_off..src_off + row_bytes]);
    }
    out
}

/// Bilinear resampling, any channel count.
pub fn resize_bilinear(src: &ImageView<'_>, dst_w: usize, dst_h: usize) -> Pixmap {
    let mut out = Pixmap::zeroed(dst_w, dst_h, src.channels);
    if src.width == 0 || src.height == 0 {
        return out;
    }

    let scale_x = src.width as f32 / dst_w as f32;
    let scale_y = src.height as f32 / dst_h as f32;

    for y in 0..dst_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, src.height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(src.height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dst_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, src.width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(src.width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..src.channels {
                let tl = src.data[src.offset(x0, y0) + c] as f32;
                let tr = src.data[src.offset(x1, y0) + c] as f32;
                let bl = src.data[src.offset(x0, y1) + c] as f32;
                let br = src.data[src.offset(x1, y1) + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                out.data[(y * dst_w + x) * src.channels + c] =
                    val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

/// Area resampling: each destination pixel averages the source rectangle it
/// maps onto, with fractional edge coverage. Preferred when downscaling.
pub fn resize_area(src: &ImageView<'_>, dst_w: usize, dst_h: usize) -> Pixmap {
    let mut out = Pixmap::zeroed(dst_w, dst_h, src.channels);
    if src.width == 0 || src.height == 0 {
        return out;
    }

    let scale_x = src.width as f64 / dst_w as f64;
    let scale_y = src.height as f64 / dst_h as f64;

    for y in 0..dst_h {
        let sy0 = y as f64 * scale_y;
        let sy1 = (y + 1) as f64 * scale_y;
        let iy0 = sy0.floor() as usize;
        let iy1 = (sy1.ceil() as usize).min(src.height);

        for x in 0..dst_w {
            let sx0 = x as f64 * scale_x;
            let sx1 = (x + 1) as f64 * scale_x;
            let ix0 = sx0.floor() as usize;
            let ix1 = (sx1.ceil() as usize).min(src.width);

            for c in 0..src.channels {
                let mut acc = 0.0f64;
                let mut weight = 0.0f64;
                for sy in iy0..iy1 {
                    let wy = (sy1.min((sy + 1) as f64) - sy0.max(sy as f64)).max(0.0);
                    for sx in ix0..ix1 {
                        let wx = (sx1.min((sx + 1) as f64) - sx0.max(sx as f64)).max(0.0);
                        acc += src.data[src.offset(sx, sy) + c] as f64 * wx * wy;
                        weight += wx * wy;
                    }
                }
                out.data[(y * dst_w + x) * src.channels + c] = if weight > 0.0 {
                    (acc / weight).round().clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }
    }

    out
}

/// Luma conversion with the standard RGB weights. Single-channel input is
/// copied through.
pub fn to_grayscale(src: &ImageView<'_>) -> Pixmap {
    let mut out = Pixmap::zeroed(src.width, src.height, 1);
    if src.channels == 1 {
        out.data.copy_from_slice(src.data);
        return out;
    }
    for y in 0..src.height {
        for x in 0..src.width {
            let off = src.offset(x, y);
            let r = src.data[off] as f32;
            let g = src.data[off + 1] as f32;
            let b = src.data[off + 2] as f32;
            out.data[y * src.width + x] =
                (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
