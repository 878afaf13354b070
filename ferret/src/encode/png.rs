/*!
# Ferret: PNG (Lossless) Encoder

Standard RGBA8 PNG, no interlace, adaptive filtering (the encoder tries
every filter type per scanline and keeps the cheapest — the practical
reading of "all filters enabled"). The `png` crate exposes zlib strength
as a coarse enum rather than a numeric `1..=9`; levels are bucketed onto
it below.
*/

use png::{AdaptiveFilterType, Compression, Encoder};

use crate::error::EncodeError;
use crate::image::RgbaImage;

/// # Encode, Lossless.
///
/// `level` is clamped to `1..=9`; see module docs for the zlib-strength
/// mapping.
pub fn encode_png(img: &RgbaImage, level: u8) -> Result<Vec<u8>, EncodeError> {
	let level = level.clamp(1, 9);
	let mut out = Vec::new();
	{
		let mut encoder = Encoder::new(&mut out, img.width, img.height);
		encoder.set_color(png::ColorType::Rgba);
		encoder.set_depth(png::BitDepth::Eight);
		encoder.set_compression(compression_for_level(level));
		encoder.set_adaptive_filter(AdaptiveFilterType::Adaptive);

		let mut writer = encoder.write_header().map_err(|_| EncodeError::Png)?;
		writer.write_image_data(&img.pixels).map_err(|_| EncodeError::Png)?;
	}
	Ok(out)
}

const fn compression_for_level(level: u8) -> Compression {
	match level {
		1..=3 => Compression::Fast,
		7..=9 => Compression::Best,
		_ => Compression::Default,
	}
}

/// # Encode at Several Levels, Keep the Smallest.
///
/// Used for the `tune_direction = +1` "smaller" case (§4.5: run `{9, 7,
/// 6}` and pick the smallest blob). Returns the winning blob and the
/// level that produced it.
pub fn encode_png_best_of(img: &RgbaImage, levels: &[u8]) -> Result<(Vec<u8>, u8), EncodeError> {
	let mut best: Option<(Vec<u8>, u8)> = None;
	for &level in levels {
		let blob = encode_png(img, level)?;
		best = match best {
			Some((b, _)) if b.len() <= blob.len() => best,
			_ => Some((blob, level)),
		};
	}
	best.ok_or(EncodeError::Png)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn checker(w: u32, h: u32) -> RgbaImage {
		let mut pixels = Vec::with_capacity(w as usize * h as usize * 4);
		for y in 0..h {
			for x in 0..w {
				let on = (x + y) % 2 == 0;
				let v = if on { 255 } else { 0 };
				pixels.extend_from_slice(&[v, v, v, 255]);
			}
		}
		RgbaImage { width: w, height: h, pixels }
	}

	#[test]
	fn encodes_a_valid_png_signature() {
		let img = checker(8, 8);
		let bytes = encode_png(&img, 5).unwrap();
		assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
	}

	#[test]
	fn best_of_never_loses_to_a_single_level() {
		let img = checker(16, 16);
		let (best, _) = encode_png_best_of(&img, &[9, 7, 6]).unwrap();
		let solo = encode_png(&img, 9).unwrap();
		assert!(best.len() <= solo.len());
	}
}
