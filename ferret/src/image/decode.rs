/*!
# Ferret: PNG Decode

A from-scratch inflate implementation is not where this system's value
lives; decode rides on the `png` crate, with every input color type
(including palette/indexed, expanded against its `PLTE`/`tRNS` chunks)
normalized to 8-bit RGBA before anything downstream ever sees it.
*/

use std::io::Cursor;
use png::{BitDepth, ColorType, Transformations};

use crate::error::DecodeError;
use super::RgbaImage;

/// # Decode a PNG Into RGBA8.
///
/// Per the open question in §9: a decode that yields zero width or height
/// is treated as a decode error, not a degenerate-but-valid image.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
	let mut decoder = png::Decoder::new(Cursor::new(bytes));
	decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);

	let mut reader = decoder.read_info().map_err(|_| DecodeError::Malformed)?;
	let palette = reader.info().palette.as_ref().map(|p| p.to_vec());
	let trns = reader.info().trns.as_ref().map(|t| t.to_vec());

	let mut buf = vec![0u8; reader.output_buffer_size()];
	let info = reader.next_frame(&mut buf).map_err(|_| DecodeError::Malformed)?;
	let raw = &buf[..info.buffer_size()];

	let (width, height) = (info.width, info.height);
	if width == 0 || height == 0 { return Err(DecodeError::ZeroDimensions); }

	// Guard against pathological dimensions before allocating the RGBA
	// expansion buffer (4 bytes/px).
	let pixel_count = u64::from(width) * u64::from(height);
	if pixel_count > 268_435_456 { return Err(DecodeError::TooLarge); }

	let pixels = match info.color_type {
		ColorType::Rgba => raw.to_vec(),
		ColorType::Rgb => expand_rgb(raw),
		ColorType::GrayscaleAlpha => expand_gray_alpha(raw),
		ColorType::Grayscale => expand_gray(raw),
		ColorType::Indexed => {
			let palette = palette.ok_or(DecodeError::Malformed)?;
			expand_indexed(raw, &palette, trns.as_deref(), info.bit_depth, pixel_count as usize)?
		}
	};

	if pixels.len() != pixel_count as usize * 4 { return Err(DecodeError::Malformed); }

	Ok(RgbaImage { width, height, pixels })
}

fn expand_rgb(raw: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(raw.len() / 3 * 4);
	for px in raw.chunks_exact(3) {
		out.extend_from_slice(&[px[0], px[1], px[2], 255]);
	}
	out
}

fn expand_gray(raw: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(raw.len() * 4);
	for &g in raw {
		out.extend_from_slice(&[g, g, g, 255]);
	}
	out
}

fn expand_gray_alpha(raw: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(raw.len() * 2);
	for px in raw.chunks_exact(2) {
		out.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
	}
	out
}

/// # Expand a Palette/Indexed Buffer Into RGBA8.
///
/// `raw` holds one palette index per pixel (the `EXPAND` transformation
/// already promotes sub-8-bit indices to a full byte each); `palette` is
/// the `PLTE` chunk (3 bytes/entry) and `trns` the optional `tRNS` chunk
/// (1 alpha byte/entry, missing entries default to fully opaque).
fn expand_indexed(raw: &[u8], palette: &[u8], trns: Option<&[u8]>, bit_depth: BitDepth, pixel_count: usize) -> Result<Vec<u8>, DecodeError> {
	let indices = unpack_indices(raw, bit_depth, pixel_count)?;

	let mut out = Vec::with_capacity(pixel_count * 4);
	for idx in indices {
		let entry = idx as usize * 3;
		let rgb = palette.get(entry..entry + 3).ok_or(DecodeError::Malformed)?;
		let alpha = trns.and_then(|t| t.get(idx as usize)).copied().unwrap_or(255);
		out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], alpha]);
	}
	Ok(out)
}

/// # Unpack Palette Indices From a (Possibly Sub-Byte) Bit Depth.
fn unpack_indices(raw: &[u8], bit_depth: BitDepth, pixel_count: usize) -> Result<Vec<u8>, DecodeError> {
	match bit_depth {
		BitDepth::Eight => {
			if raw.len() < pixel_count { return Err(DecodeError::Malformed); }
			Ok(raw[..pixel_count].to_vec())
		},
		BitDepth::One | BitDepth::Two | BitDepth::Four => {
			let bits = match bit_depth { BitDepth::One => 1, BitDepth::Two => 2, _ => 4 };
			let per_byte = 8 / bits;
			let mut indices = Vec::with_capacity(pixel_count);
			'outer: for byte in raw {
				for slot in 0..per_byte {
					if indices.len() == pixel_count { break 'outer; }
					let shift = 8 - bits * (slot + 1);
					let mask = ((1u16 << bits) - 1) as u8;
					indices.push((byte >> shift) & mask);
				}
			}
			if indices.len() != pixel_count { return Err(DecodeError::Malformed); }
			Ok(indices)
		},
		BitDepth::Sixteen => Err(DecodeError::Malformed),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn encode_rgba(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
		let mut out = Vec::new();
		{
			let mut encoder = png::Encoder::new(&mut out, width, height);
			encoder.set_color(ColorType::Rgba);
			encoder.set_depth(png::BitDepth::Eight);
			let mut writer = encoder.write_header().unwrap();
			writer.write_image_data(pixels).unwrap();
		}
		out
	}

	#[test]
	fn decode_round_trip_matches_input() {
		let pixels: Vec<u8> = (0..(4 * 4 * 4)).map(|i| (i % 256) as u8).collect();
		let encoded = encode_rgba(4, 4, &pixels);
		let decoded = decode_png(&encoded).expect("decode should succeed");
		assert_eq!(decoded.width, 4);
		assert_eq!(decoded.height, 4);
		assert_eq!(decoded.pixels, pixels);
	}

	#[test]
	fn garbage_bytes_are_a_decode_error() {
		let err = decode_png(b"not a png").unwrap_err();
		assert_eq!(err, DecodeError::Malformed);
	}

	fn encode_indexed(width: u32, height: u32, indices: &[u8], palette: &[u8], trns: &[u8]) -> Vec<u8> {
		let mut out = Vec::new();
		{
			let mut encoder = png::Encoder::new(&mut out, width, height);
			encoder.set_color(ColorType::Indexed);
			encoder.set_depth(png::BitDepth::Eight);
			encoder.set_palette(palette.to_vec());
			encoder.set_trns(trns.to_vec());
			let mut writer = encoder.write_header().unwrap();
			writer.write_image_data(indices).unwrap();
		}
		out
	}

	#[test]
	fn palette_png_expands_to_rgba() {
		// Two palette entries: opaque red, half-transparent green.
		let palette = [255, 0, 0, 0, 255, 0];
		let trns = [255, 128];
		let indices = [0, 1, 1, 0];
		let encoded = encode_indexed(2, 2, &indices, &palette, &trns);

		let decoded = decode_png(&encoded).expect("indexed decode should succeed");
		assert_eq!(decoded.width, 2);
		assert_eq!(decoded.height, 2);
		assert_eq!(
			decoded.pixels,
			vec![
				255, 0, 0, 255, 0, 255, 0, 128,
				0, 255, 0, 128, 255, 0, 0, 255,
			],
		);
	}
}
