/*!
# Ferret Quant

A from-scratch median-cut palette quantizer for 8-bit RGBA buffers. This
crate owns none of the PNG container format; it only turns a full-color
image into a bounded palette plus one index per pixel.
*/

#![warn(missing_docs)]
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
#![warn(unused_import_braces)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]

/// # Number of 4-bit-per-channel histogram buckets (16^4).
const BUCKET_COUNT: usize = 65_536;

/// # Channel Index.
///
/// `R`, `G`, `B`, `A`, in the tie-break order the split picks among
/// equally-wide channels.
const CHANNELS: [usize; 4] = [0, 1, 2, 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Weighted Color.
///
/// One representative RGBA color plus the pixel count it stands in for.
/// Seeded from a histogram bucket, later averaged into a palette entry.
struct WeightedColor {
	/// # Channel Values (R, G, B, A).
	ch: [u8; 4],
	/// # Pixel Count.
	count: u64,
}

impl WeightedColor {
	#[inline]
	const fn val(&self, channel: usize) -> u8 { self.ch[channel] }
}

#[derive(Debug, Clone, Copy)]
/// # Color Box.
///
/// A contiguous `[start, end)` slice of the shared color table, along with
/// its cached per-channel bounds and total pixel weight.
struct ColorBox {
	start: usize,
	end: usize,
	min: [u8; 4],
	max: [u8; 4],
	weight: u64,
}

impl ColorBox {
	/// # Population.
	const fn len(&self) -> usize { self.end - self.start }

	/// # Widest Channel.
	///
	/// Returns the channel with the largest `max - min` spread, breaking
	/// ties by channel order R, G, B, A. Returns `None` if every channel is
	/// flat (a fully uniform box).
	fn widest_channel(&self) -> Option<(usize, u16)> {
		let mut best: Option<(usize, u16)> = None;
		for &c in &CHANNELS {
			let spread = u16::from(self.max[c]) - u16::from(self.min[c]);
			if spread > 0 {
				match best {
					Some((_, b)) if b >= spread => {},
					_ => { best = Some((c, spread)); },
				}
			}
		}
		best
	}

	/// # Recompute Bounds.
	///
	/// Rescans `colors[self.start..self.end]` to refresh `min`, `max`, and
	/// `weight`. Called after the slice has been sorted/split.
	fn refresh(&mut self, colors: &[WeightedColor]) {
		let slice = &colors[self.start..self.end];
		let mut min = [u8::MAX; 4];
		let mut max = [0u8; 4];
		let mut weight = 0u64;
		for c in slice {
			for ch in 0..4 {
				if c.ch[ch] < min[ch] { min[ch] = c.ch[ch]; }
				if c.ch[ch] > max[ch] { max[ch] = c.ch[ch]; }
			}
			weight += c.count;
		}
		self.min = min;
		self.max = max;
		self.weight = weight;
	}
}

#[derive(Debug, Clone)]
/// # Quantized Image.
///
/// The output of [`quantize`]: a palette of at most 256 RGBA entries and
/// one palette index per input pixel.
pub struct QuantizedImage {
	/// # Width (px).
	pub width: u32,
	/// # Height (px).
	pub height: u32,
	/// # Palette Entries (RGBA).
	pub palette: Vec<[u8; 4]>,
	/// # Per-Pixel Palette Indices.
	pub indices: Vec<u8>,
}

impl QuantizedImage {
	#[must_use]
	/// # Translucent Palette Length.
	///
	/// Returns the length a `tRNS` chunk needs to cover every
	/// non-fully-opaque palette entry: one past the highest index whose
	/// alpha is less than 255, or `0` if the palette is fully opaque.
	pub fn trns_len(&self) -> usize {
		self.palette.iter().rposition(|c| c[3] < 255).map_or(0, |i| i + 1)
	}
}

#[must_use]
/// # Quantize an RGBA Buffer.
///
/// Reduces `rgba` (tightly packed 8-bit RGBA, `width * height * 4` bytes)
/// to a palette of at most `target_colors` entries (clamped to `1..=256`)
/// using median-cut over a 4-bit-per-channel histogram.
///
/// # Panics
///
/// Panics if `rgba.len() != width as usize * height as usize * 4`, or if
/// `width == 0 || height == 0`.
pub fn quantize(rgba: &[u8], width: u32, height: u32, target_colors: u16) -> QuantizedImage {
	assert!(width > 0 && height > 0, "quantize requires a non-empty image");
	assert_eq!(rgba.len(), width as usize * height as usize * 4, "rgba buffer size mismatch");

	let target = target_colors.clamp(1, 256) as usize;

	// Step 1+2: histogram buckets -> seed colors.
	let mut colors = histogram_seed_colors(rgba);

	// Step 3: median-cut split.
	let boxes = median_cut(&mut colors, target);

	// Step 4: palette = weighted mean per box.
	let palette: Vec<[u8; 4]> = boxes.iter()
		.map(|b| weighted_mean(&colors[b.start..b.end]))
		.collect();

	// Step 5: map every pixel to its nearest palette entry.
	let indices = map_pixels(rgba, &palette);

	QuantizedImage { width, height, palette, indices }
}

/// # Build the 4-bit-per-channel Histogram and Seed Colors.
fn histogram_seed_colors(rgba: &[u8]) -> Vec<WeightedColor> {
	#[derive(Clone, Copy, Default)]
	struct Accum { count: u64, sum: [u64; 4] }

	let mut buckets: Vec<Accum> = vec![Accum::default(); BUCKET_COUNT];

	for px in rgba.chunks_exact(4) {
		let (r, g, b, a) = (px[0], px[1], px[2], px[3]);
		let idx =
			((r >> 4) as usize) << 12 |
			((g >> 4) as usize) << 8 |
			((b >> 4) as usize) << 4 |
			(a >> 4) as usize;
		let acc = &mut buckets[idx];
		acc.count += 1;
		acc.sum[0] += u64::from(r);
		acc.sum[1] += u64::from(g);
		acc.sum[2] += u64::from(b);
		acc.sum[3] += u64::from(a);
	}

	buckets.into_iter()
		.filter(|b| b.count > 0)
		.map(|b| {
			let mut ch = [0u8; 4];
			for i in 0..4 { ch[i] = (b.sum[i] / b.count) as u8; }
			WeightedColor { ch, count: b.count }
		})
		.collect()
}

/// # Median-Cut Split.
///
/// Splits `colors` in place into at most `target` [`ColorBox`]es, widest
/// box first, stopping early once no box has two or more distinct colors.
fn median_cut(colors: &mut [WeightedColor], target: usize) -> Vec<ColorBox> {
	let mut initial = ColorBox { start: 0, end: colors.len(), min: [0; 4], max: [0; 4], weight: 0 };
	initial.refresh(colors);
	let mut boxes = vec![initial];

	while boxes.len() < target {
		// Pick the widest splittable box (>= 2 colors, non-flat).
		let pick = boxes.iter()
			.enumerate()
			.filter(|(_, b)| b.len() >= 2)
			.filter_map(|(i, b)| b.widest_channel().map(|(ch, spread)| (i, ch, spread)))
			.max_by_key(|&(_, _, spread)| spread);

		let Some((i, channel, _)) = pick else { break };
		let b = boxes[i];

		// Stable sort by (channel value, -count) so equal-value ties keep
		// heavier colors first.
		colors[b.start..b.end].sort_by(|x, y| {
			x.val(channel).cmp(&y.val(channel)).then_with(|| y.count.cmp(&x.count))
		});

		// Split at the population median, clamped so both halves are non-empty.
		let total_weight: u64 = colors[b.start..b.end].iter().map(|c| c.count).sum();
		let half = total_weight / 2;
		let mut running = 0u64;
		let mut split = b.start + 1;
		for (offset, c) in colors[b.start..b.end].iter().enumerate() {
			running += c.count;
			if running >= half {
				split = b.start + offset + 1;
				break;
			}
		}
		split = split.clamp(b.start + 1, b.end - 1);

		let mut left = ColorBox { start: b.start, end: split, min: [0; 4], max: [0; 4], weight: 0 };
		let mut right = ColorBox { start: split, end: b.end, min: [0; 4], max: [0; 4], weight: 0 };
		left.refresh(colors);
		right.refresh(colors);

		boxes[i] = left;
		boxes.push(right);
	}

	boxes
}

/// # Weighted Mean of a Box's Colors.
fn weighted_mean(slice: &[WeightedColor]) -> [u8; 4] {
	let mut sum = [0u64; 4];
	let mut weight = 0u64;
	for c in slice {
		for ch in 0..4 { sum[ch] += u64::from(c.ch[ch]) * c.count; }
		weight += c.count;
	}
	if weight == 0 { return [0, 0, 0, 0]; }
	let mut out = [0u8; 4];
	for ch in 0..4 { out[ch] = (sum[ch] / weight) as u8; }
	out
}

/// # Map Every Pixel to Its Nearest Palette Index.
fn map_pixels(rgba: &[u8], palette: &[[u8; 4]]) -> Vec<u8> {
	rgba.chunks_exact(4)
		.map(|px| nearest_index(px, palette))
		.collect()
}

/// # Nearest Palette Index (Squared Euclidean Distance).
fn nearest_index(px: &[u8], palette: &[[u8; 4]]) -> u8 {
	let mut best_idx = 0usize;
	let mut best_dist = u32::MAX;
	for (i, c) in palette.iter().enumerate() {
		let dist = sq_dist(px, c);
		if dist < best_dist {
			best_dist = dist;
			best_idx = i;
			if dist == 0 { break; }
		}
	}
	best_idx as u8
}

#[inline]
/// # Squared Euclidean Distance Between a Pixel and a Palette Entry.
fn sq_dist(px: &[u8], c: &[u8; 4]) -> u32 {
	let mut total = 0u32;
	for ch in 0..4 {
		let d = i32::from(px[ch]) - i32::from(c[ch]);
		total += (d * d) as u32;
	}
	total
}

#[cfg(test)]
mod tests {
	use super::*;

	fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
		let mut out = Vec::with_capacity(w as usize * h as usize * 4);
		for _ in 0..(w * h) { out.extend_from_slice(&rgba); }
		out
	}

	#[test]
	fn single_color_collapses_to_one_entry() {
		let img = solid(4, 4, [10, 20, 30, 255]);
		let q = quantize(&img, 4, 4, 256);
		assert_eq!(q.palette.len(), 1);
		assert_eq!(q.palette[0], [10, 20, 30, 255]);
		assert!(q.indices.iter().all(|&i| i == 0));
	}

	#[test]
	fn target_colors_is_an_upper_bound() {
		// Four very distinct colors should never collapse below 4 entries
		// when target is comfortably above that.
		let mut img = Vec::new();
		for rgba in [[0, 0, 0, 255], [255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]] {
			img.extend_from_slice(&rgba);
		}
		let q = quantize(&img, 2, 2, 256);
		assert!(q.palette.len() <= 4);
		assert!(q.palette.len() >= 2);

		let q2 = quantize(&img, 2, 2, 2);
		assert!(q2.palette.len() <= 2);
	}

	#[test]
	fn trns_len_tracks_highest_translucent_index() {
		let mut img = Vec::new();
		for rgba in [[0, 0, 0, 255], [10, 10, 10, 128], [255, 255, 255, 255]] {
			img.extend_from_slice(&rgba);
		}
		let q = quantize(&img, 3, 1, 256);
		let translucent_exists = q.palette.iter().any(|c| c[3] < 255);
		if translucent_exists {
			assert!(q.trns_len() > 0);
			assert!(q.trns_len() <= q.palette.len());
		}
	}

	#[test]
	fn indices_are_in_bounds() {
		let img = solid(8, 8, [1, 2, 3, 4]);
		let q = quantize(&img, 8, 8, 5);
		for &i in &q.indices {
			assert!((i as usize) < q.palette.len());
		}
		assert_eq!(q.indices.len(), 64);
	}

	#[test]
	#[should_panic]
	fn zero_dimensions_panics() {
		let _ = quantize(&[], 0, 0, 16);
	}
}
