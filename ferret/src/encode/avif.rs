/*!
# Ferret: AVIF Encoder

Wraps `ravif`. Callers pass a min quantizer (lower = better, `0..=63`,
AV1 convention); `ravif` takes a quality percentage (higher = better),
so the value is inverted before handing it to the encoder.
*/

use imgref::Img;
use rgb::RGBA8;

use crate::error::EncodeError;
use crate::image::RgbaImage;

const SPEED: u8 = 6;
const MAX_THREADS: usize = 4;

/// # Encode.
///
/// `min_quantizer` is clamped to `0..=63`; the max quantizer passed to the
/// encoder is `min(min_quantizer + 8, 63)` per §4.3.
pub fn encode_avif(img: &RgbaImage, min_quantizer: u8) -> Result<Vec<u8>, EncodeError> {
	let min_quantizer = min_quantizer.min(63);
	let max_quantizer = min_quantizer.saturating_add(8).min(63);

	let quality = quantizer_to_quality(min_quantizer);
	let alpha_quality = quantizer_to_quality(max_quantizer);

	let pixels: Vec<RGBA8> = img.pixels
		.chunks_exact(4)
		.map(|p| RGBA8::new(p[0], p[1], p[2], p[3]))
		.collect();
	let buffer = Img::new(pixels, img.width as usize, img.height as usize);

	let encoder = ravif::Encoder::new()
		.with_quality(quality)
		.with_alpha_quality(alpha_quality)
		.with_speed(SPEED)
		.with_num_threads(Some(MAX_THREADS));

	let result = encoder.encode_rgba(buffer.as_ref()).map_err(|_| EncodeError::Avif)?;
	Ok(result.avif_file)
}

/// # Quantizer (`0..=63`, lower better) to `ravif` Quality (`1..=100`, higher better).
fn quantizer_to_quality(q: u8) -> f32 {
	let q = f32::from(q.min(63));
	(100.0 - q * (100.0 / 63.0)).clamp(1.0, 100.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quantizer_extremes_map_to_quality_extremes() {
		assert!(quantizer_to_quality(0) > 99.0);
		assert!(quantizer_to_quality(63) < 2.0);
	}

	#[test]
	fn quantizer_to_quality_is_monotonically_decreasing() {
		assert!(quantizer_to_quality(10) > quantizer_to_quality(40));
	}
}
