/*!
# Ferret: WebP Encoder

Thin wrapper around the `webp` crate's libwebp bindings; lossy only, no
alpha-specific quality split (libwebp handles that internally).
*/

use crate::error::EncodeError;
use crate::image::RgbaImage;

/// # Encode, Lossy.
///
/// `quality` is clamped to `10..=100`.
pub fn encode_webp(img: &RgbaImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
	let quality = quality.clamp(10, 100);
	let encoder = webp::Encoder::from_rgba(&img.pixels, img.width, img.height);
	let memory = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
		encoder.encode(f32::from(quality))
	}))
	.map_err(|_| EncodeError::Webp)?;

	if memory.is_empty() { return Err(EncodeError::Webp); }
	Ok(memory.to_vec())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_nonempty_bytes_with_a_riff_header() {
		let pixels: Vec<u8> = (0..(8 * 8)).flat_map(|i| [i as u8, 0, 0, 255]).collect();
		let img = RgbaImage { width: 8, height: 8, pixels };
		let bytes = encode_webp(&img, 80).unwrap();
		assert_eq!(&bytes[..4], b"RIFF");
		assert_eq!(&bytes[8..12], b"WEBP");
	}
}
