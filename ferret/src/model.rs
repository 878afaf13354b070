/*!
# Ferret: Data Model

`Job`, `EncodedImage`, `JobResult`, and the small value types that carry
encoding intent between the HTTP layer and the worker pool. See §3.
*/

use std::time::Instant;
use crate::progress::ProgressHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// # Output Format.
pub enum Format {
	/// # Lossless PNG.
	Png,
	/// # Palette-Quantized PNG.
	PngQuant,
	/// # Lossy WebP.
	Webp,
	/// # AVIF.
	Avif,
}

impl Format {
	#[must_use]
	/// # Wire Name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Png => "png",
			Self::PngQuant => "pngquant",
			Self::Webp => "webp",
			Self::Avif => "avif",
		}
	}

	#[must_use]
	/// # MIME Type.
	pub const fn mime(self) -> &'static str {
		match self {
			Self::Png | Self::PngQuant => "image/png",
			Self::Webp => "image/webp",
			Self::Avif => "image/avif",
		}
	}

	#[must_use]
	/// # File Extension.
	pub const fn extension(self) -> &'static str {
		match self {
			Self::Png | Self::PngQuant => "png",
			Self::Webp => "webp",
			Self::Avif => "avif",
		}
	}

	#[must_use]
	/// # Default Label.
	pub const fn default_label(self) -> &'static str {
		match self {
			Self::Png => "lossless",
			Self::PngQuant => "pngquant q80",
			Self::Webp => "high",
			Self::Avif => "medium",
		}
	}

	#[must_use]
	/// # Parse from the Wire Name.
	///
	/// Case-insensitive, matching the header/tune-target parsing in §4.6.
	pub fn parse(s: &str) -> Option<Self> {
		match s.to_ascii_lowercase().as_str() {
			"png" => Some(Self::Png),
			"pngquant" => Some(Self::PngQuant),
			"webp" => Some(Self::Webp),
			"avif" => Some(Self::Avif),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Tuning Applied to an Output.
pub enum Tuning {
	/// # Neutral / Expert Mode.
	None,
	/// # Tuned Toward Smaller Output.
	More,
	/// # Tuned Toward Higher Quality.
	Less,
}

impl Tuning {
	#[must_use]
	/// # Wire Value.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::None => "",
			Self::More => "more",
			Self::Less => "less",
		}
	}

	#[must_use]
	/// # From a Tune Direction.
	pub const fn from_direction(d: i8) -> Self {
		match d {
			d if d > 0 => Self::More,
			d if d < 0 => Self::Less,
			_ => Self::None,
		}
	}
}

#[derive(Debug, Clone)]
/// # One Encoded Output.
pub struct EncodedImage {
	/// # Format.
	pub format: Format,
	/// # Human Label (e.g. `"high"`, `"q80"`).
	pub label: String,
	/// # Tuning Applied.
	pub tuning: Tuning,
	/// # Encoded Bytes.
	pub bytes: Vec<u8>,
	/// # Wall-Clock Milliseconds the Encoder Took.
	pub elapsed_ms: u64,
}

impl EncodedImage {
	#[must_use]
	/// # MIME Type.
	pub const fn mime(&self) -> &'static str { self.format.mime() }

	#[must_use]
	/// # File Extension.
	pub const fn extension(&self) -> &'static str { self.format.extension() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Requested Crop Region.
pub struct CropSpec {
	/// # Enabled.
	pub enabled: bool,
	/// # Left Offset (may be negative; clamped at apply time).
	pub x: i64,
	/// # Top Offset.
	pub y: i64,
	/// # Width.
	pub w: i64,
	/// # Height.
	pub h: i64,
}

impl Default for CropSpec {
	fn default() -> Self { Self { enabled: false, x: 0, y: 0, w: 0, h: 0 } }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// # Requested Alpha-Threshold Trim.
pub struct TrimSpec {
	/// # Enabled.
	pub enabled: bool,
	/// # Tolerance, `0.0..=1.0`.
	pub tolerance: f32,
}

impl Default for TrimSpec {
	fn default() -> Self { Self { enabled: false, tolerance: 0.0 } }
}

#[derive(Debug, Clone)]
/// # One Expert-Mode Output Request.
pub struct RequestedOutput {
	/// # Format.
	pub format: Format,
	/// # Optional Override Label.
	pub label: Option<String>,
	/// # PNG Compression Level (lossless), `1..=9`.
	pub png_level: u8,
	/// # Palette Target Colors, `1..=256`.
	pub pngquant_colors: u16,
	/// # WebP Quality, `10..=100`.
	pub webp_quality: u8,
	/// # AVIF Min Quantizer, `0..=63`.
	pub avif_quality: u8,
}

#[derive(Debug, Clone)]
/// # Job Mode.
pub enum JobMode {
	/// # Simple Mode — Four Fixed Tasks, Optionally Filtered/Tuned.
	Simple {
		/// # Restrict to This Format, if Any.
		tune_format: Option<Format>,
		/// # Restrict to This Label, if Any (only meaningful with `tune_format`).
		tune_label: Option<String>,
		/// # `-1`, `0`, or `+1`.
		tune_direction: i8,
	},
	/// # Expert Mode — Explicit Output List Plus Pre-Processing.
	Expert {
		/// # Requested Outputs, in Submission Order.
		outputs: Vec<RequestedOutput>,
		/// # Trim Pass.
		trim: TrimSpec,
		/// # Crop Pass.
		crop: CropSpec,
	},
}

#[derive(Debug)]
/// # One Compression Job.
///
/// Produced by ingress, consumed exactly once by a worker (Invariant 1).
pub struct Job {
	/// # Monotonic, Nonzero Job Id.
	pub id: u64,
	/// # Input PNG Bytes.
	pub bytes: Vec<u8>,
	/// # Sanitized Filename.
	pub filename: String,
	/// # Enqueue Time.
	pub enqueue_time: Instant,
	/// # Progress Channel Handle, if the Caller Registered One.
	pub progress: Option<ProgressHandle>,
	/// # Mode.
	pub mode: JobMode,
}

#[derive(Debug, Clone)]
/// # One Finished Job's Result.
pub struct JobResult {
	/// # Job Id (equals the originating `Job::id`, Invariant 2).
	pub id: u64,
	/// # Input Byte Count.
	pub input_size: u64,
	/// # Encoded Outputs (Empty on Failure).
	pub images: Vec<EncodedImage>,
	/// # Status: `0` Ok, `<0` on First Encoder/Decoder Failure.
	pub status: i32,
	/// # Short Message/Code.
	pub message: String,
	/// # Start Timestamp (Monotonic).
	pub start: Instant,
	/// # End Timestamp (Monotonic).
	pub end: Instant,
	/// # Input Dimensions.
	pub input_dims: (u32, u32),
	/// # Output Dimensions (post trim/crop).
	pub output_dims: (u32, u32),
	/// # Whether Trim Changed the Geometry.
	pub trim_applied: bool,
	/// # Whether Crop Was Applied.
	pub crop_applied: bool,
}

impl JobResult {
	#[must_use]
	/// # Elapsed Milliseconds.
	pub fn duration_ms(&self) -> u64 {
		self.end.saturating_duration_since(self.start).as_millis() as u64
	}

	#[must_use]
	/// # Is This a Success?
	pub const fn is_ok(&self) -> bool { self.status == 0 }
}
