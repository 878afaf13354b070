/*!
# Ferret: Errors

One hand-rolled enum per failure domain, each able to render its own wire
short-code and HTTP status. No `thiserror`/`anyhow` — matching the
teacher's manual `Display`/`Error` style.
*/

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Decode Errors.
pub enum DecodeError {
	/// # Malformed PNG Stream.
	Malformed,
	/// # Decoded to Zero Dimensions.
	ZeroDimensions,
	/// # Image Exceeds Internal Limits.
	TooLarge,
}

impl DecodeError {
	#[must_use]
	/// # Wire Short Code.
	pub const fn code(self) -> &'static str { "decode_error" }
}

impl fmt::Display for DecodeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Malformed => "malformed PNG stream",
			Self::ZeroDimensions => "decoded image has zero width or height",
			Self::TooLarge => "decoded image exceeds internal pixel limits",
		})
	}
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Encode Errors.
///
/// One variant per encoder; the wire code is exactly the short code §7
/// specifies for that encoder's failure.
pub enum EncodeError {
	/// # PNG (Lossless) Encode Failure.
	Png,
	/// # Palette Quantization / PNG Encode Failure.
	PngQuant,
	/// # WebP Encode Failure.
	Webp,
	/// # AVIF Encode Failure.
	Avif,
}

impl EncodeError {
	#[must_use]
	/// # Wire Short Code.
	pub const fn code(self) -> &'static str {
		match self {
			Self::Png => "png_compress_error",
			Self::PngQuant => "pngquant_error",
			Self::Webp => "webp_compress_error",
			Self::Avif => "avif_compress_error",
		}
	}
}

impl fmt::Display for EncodeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

impl std::error::Error for EncodeError {}

#[derive(Debug, Clone)]
/// # HTTP-Facing Errors.
///
/// Every request-handling failure path collapses into one of these before
/// it reaches the response writer, so status/code/message are always in
/// lockstep.
pub enum HttpError {
	/// # 400.
	BadRequest(&'static str),
	/// # 401.
	Unauthorized,
	/// # 404.
	NotFound,
	/// # 413.
	PayloadTooLarge,
	/// # 429.
	TooManyRequests,
	/// # 503, with the short code to forward as a progress event (if any).
	ServerBusy,
	/// # 500, from an encoder/decoder failure already carried in a `Result`.
	Encoder(&'static str),
	/// # 500, catch-all.
	Internal(&'static str),
	/// # 501 — a collaborator endpoint with no real backend configured.
	NotImplemented,
}

impl HttpError {
	#[must_use]
	/// # HTTP Status Code.
	pub const fn status(&self) -> u16 {
		match self {
			Self::BadRequest(_) => 400,
			Self::Unauthorized => 401,
			Self::NotFound => 404,
			Self::PayloadTooLarge => 413,
			Self::TooManyRequests => 429,
			Self::ServerBusy => 503,
			Self::Encoder(_) | Self::Internal(_) => 500,
			Self::NotImplemented => 501,
		}
	}

	#[must_use]
	/// # Wire Short Code.
	pub const fn message(&self) -> &'static str {
		match self {
			Self::BadRequest(m) => m,
			Self::Unauthorized => "unauthorized",
			Self::NotFound => "not_found",
			Self::PayloadTooLarge => "payload_too_large",
			Self::TooManyRequests => "too_many_requests",
			Self::ServerBusy => "server_busy",
			Self::Encoder(code) => code,
			Self::Internal(m) => m,
			Self::NotImplemented => "not_implemented",
		}
	}
}

impl fmt::Display for HttpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.message()) }
}

impl std::error::Error for HttpError {}

impl From<DecodeError> for HttpError {
	fn from(_: DecodeError) -> Self { Self::Encoder("decode_error") }
}

impl From<EncodeError> for HttpError {
	fn from(e: EncodeError) -> Self { Self::Encoder(e.code()) }
}
