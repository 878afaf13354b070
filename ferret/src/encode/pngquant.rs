/*!
# Ferret: Palette-Quantized PNG Encoder

Wraps [`ferret_quant::quantize`] and writes the result as an indexed PNG,
attaching a `tRNS` chunk only as large as the quantizer says it needs to
be (§4.3.1 step 6).
*/

use png::Encoder;

use crate::error::EncodeError;
use crate::image::RgbaImage;

/// # Encode, Palette-Quantized.
///
/// `target_colors` is clamped to `1..=256` before quantizing.
pub fn encode_pngquant(img: &RgbaImage, target_colors: u16) -> Result<Vec<u8>, EncodeError> {
	let target_colors = target_colors.clamp(1, 256);
	let quantized = ferret_quant::quantize(&img.pixels, img.width, img.height, target_colors);

	let mut rgb_palette = Vec::with_capacity(quantized.palette.len() * 3);
	let mut alpha_palette = Vec::with_capacity(quantized.palette.len());
	for c in &quantized.palette {
		rgb_palette.extend_from_slice(&c[..3]);
		alpha_palette.push(c[3]);
	}

	let mut out = Vec::new();
	{
		let mut encoder = Encoder::new(&mut out, img.width, img.height);
		encoder.set_color(png::ColorType::Indexed);
		encoder.set_depth(png::BitDepth::Eight);
		encoder.set_palette(rgb_palette);

		let trns_len = quantized.trns_len();
		if trns_len > 0 {
			encoder.set_trns(alpha_palette[..trns_len].to_vec());
		}

		let mut writer = encoder.write_header().map_err(|_| EncodeError::PngQuant)?;
		writer.write_image_data(&quantized.indices).map_err(|_| EncodeError::PngQuant)?;
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_a_two_color_image_losslessly_within_palette_budget() {
		let pixels: Vec<u8> = (0..16)
			.flat_map(|i| if i % 2 == 0 { [255, 0, 0, 255] } else { [0, 255, 0, 255] })
			.collect();
		let img = RgbaImage { width: 4, height: 4, pixels };
		let bytes = encode_pngquant(&img, 8).unwrap();
		assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
	}

	#[test]
	fn translucent_palette_gets_a_sized_trns_chunk() {
		let pixels: Vec<u8> = (0..4).flat_map(|_| [10, 20, 30, 128]).collect();
		let img = RgbaImage { width: 2, height: 2, pixels };
		let bytes = encode_pngquant(&img, 4).unwrap();
		// A tRNS chunk type tag must appear somewhere in the stream.
		assert!(bytes.windows(4).any(|w| w == b"tRNS"));
	}
}
