/*!
# Ferret: Image Ops (C4)

Alpha-threshold auto-trim and bounded crop, operating directly on
[`RgbaImage`] buffers, clamping requested regions to image bounds rather
than rejecting out-of-range requests outright.
*/

use std::fmt;

use super::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Crop Failure.
pub enum CropError {
	/// # The Clamped Region Has Zero Area.
	EmptyRegion,
}

impl fmt::Display for CropError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("crop region is empty after clamping to image bounds")
	}
}

impl std::error::Error for CropError {}

/// # Crop.
///
/// `x`/`y` are shifted up to `0` if negative; `w`/`h` are shrunk so the
/// region never exceeds the image's far edge. Fails if the clamped region
/// has no area.
pub fn crop(img: &RgbaImage, x: i64, y: i64, w: i64, h: i64) -> Result<RgbaImage, CropError> {
	let (cx, cy, cw, ch) = clamp_region(img.width, img.height, x, y, w, h)?;

	let mut pixels = Vec::with_capacity(cw as usize * ch as usize * 4);
	for row in 0..ch {
		let src_y = cy + row;
		let row_start = (src_y as usize * img.width as usize + cx as usize) * 4;
		let row_end = row_start + cw as usize * 4;
		pixels.extend_from_slice(&img.pixels[row_start..row_end]);
	}

	Ok(RgbaImage { width: cw, height: ch, pixels })
}

fn clamp_region(width: u32, height: u32, x: i64, y: i64, w: i64, h: i64) -> Result<(u32, u32, u32, u32), CropError> {
	let cx = x.max(0).min(i64::from(width));
	let cy = y.max(0).min(i64::from(height));
	let max_w = i64::from(width) - cx;
	let max_h = i64::from(height) - cy;
	let cw = w.max(0).min(max_w);
	let ch = h.max(0).min(max_h);

	if cw <= 0 || ch <= 0 { return Err(CropError::EmptyRegion); }

	Ok((cx as u32, cy as u32, cw as u32, ch as u32))
}

/// # Trim.
///
/// Finds the tight bounding box of pixels whose alpha exceeds
/// `round(tolerance * 255)`, then crops to it. An image with nothing above
/// threshold collapses to a single pixel at `(0, 0)`. Returns the
/// (possibly unchanged) image plus whether the geometry actually changed.
pub fn trim(img: &RgbaImage, tolerance: f32) -> (RgbaImage, bool) {
	let threshold = (tolerance.clamp(0.0, 1.0) * 255.0).round() as u8;

	let mut min_x = img.width;
	let mut min_y = img.height;
	let mut max_x = 0u32;
	let mut max_y = 0u32;
	let mut found = false;

	for y in 0..img.height {
		let row_base = y as usize * img.width as usize * 4;
		for x in 0..img.width {
			let alpha = img.pixels[row_base + x as usize * 4 + 3];
			if alpha > threshold {
				found = true;
				if x < min_x { min_x = x; }
				if x > max_x { max_x = x; }
				if y < min_y { min_y = y; }
				if y > max_y { max_y = y; }
			}
		}
	}

	if !found {
		let single = RgbaImage { width: 1, height: 1, pixels: vec![0, 0, 0, 0] };
		let applied = img.width != 1 || img.height != 1;
		return (single, applied);
	}

	let (w, h) = (max_x - min_x + 1, max_y - min_y + 1);
	let applied = w != img.width || h != img.height;
	if !applied {
		return (img.clone(), false);
	}

	let cropped = crop(img, i64::from(min_x), i64::from(min_y), i64::from(w), i64::from(h))
		.expect("bounding box is always within image bounds");
	(cropped, true)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
		let mut pixels = Vec::with_capacity(w as usize * h as usize * 4);
		for _ in 0..(w * h) { pixels.extend_from_slice(&rgba); }
		RgbaImage { width: w, height: h, pixels }
	}

	#[test]
	fn full_crop_is_identity() {
		let img = solid(5, 5, [9, 8, 7, 6]);
		let out = crop(&img, 0, 0, 5, 5).unwrap();
		assert_eq!(out.width, 5);
		assert_eq!(out.height, 5);
		assert_eq!(out.pixels, img.pixels);
	}

	#[test]
	fn negative_offsets_shift_to_zero() {
		let img = solid(4, 4, [1, 2, 3, 4]);
		let out = crop(&img, -2, -2, 3, 3).unwrap();
		assert_eq!((out.width, out.height), (3, 3));
	}

	#[test]
	fn oversized_dims_shrink_to_edge() {
		let img = solid(4, 4, [1, 2, 3, 4]);
		let out = crop(&img, 2, 2, 100, 100).unwrap();
		assert_eq!((out.width, out.height), (2, 2));
	}

	#[test]
	fn empty_region_is_an_error() {
		let img = solid(4, 4, [1, 2, 3, 4]);
		assert!(crop(&img, 10, 10, 1, 1).is_err());
	}

	#[test]
	fn trim_finds_tight_opaque_center() {
		// 4x4 transparent border, 2x2 opaque center.
		let mut img = solid(4, 4, [0, 0, 0, 0]);
		for y in 1..3 {
			for x in 1..3 {
				let base = (y * 4 + x) * 4;
				img.pixels[base..base + 4].copy_from_slice(&[255, 255, 255, 255]);
			}
		}
		let (out, applied) = trim(&img, 0.0);
		assert!(applied);
		assert_eq!((out.width, out.height), (2, 2));
	}

	#[test]
	fn trim_is_idempotent() {
		let mut img = solid(4, 4, [0, 0, 0, 0]);
		let base = (1 * 4 + 1) * 4;
		img.pixels[base..base + 4].copy_from_slice(&[1, 2, 3, 255]);
		let (once, _) = trim(&img, 0.0);
		let (twice, applied_again) = trim(&once, 0.0);
		assert_eq!(once.pixels, twice.pixels);
		assert!(!applied_again);
	}

	#[test]
	fn fully_transparent_image_collapses_to_single_pixel() {
		let img = solid(8, 8, [0, 0, 0, 0]);
		let (out, applied) = trim(&img, 0.0);
		assert!(applied);
		assert_eq!((out.width, out.height), (1, 1));
		assert_eq!(out.pixels, vec![0, 0, 0, 0]);
	}
}
