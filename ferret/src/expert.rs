/*!
# Ferret: Expert Orchestration (C7)

Multipart parsing, per-file metadata resolution, the auth gate, and the
daily-quota check for `/api/expert/compress`. Submission and result
matching themselves are the HTTP dispatcher's job (`http::result_router`);
this module only gets a request from raw bytes to a list of jobs-to-run.
*/

use serde_json::Value;

use crate::auth::AuthStore;
use crate::error::HttpError;
use crate::model::{CropSpec, Format, JobMode, RequestedOutput, TrimSpec};
use crate::usage::{QuotaOutcome, UsageTable};

/// # Per-File Encode Parameters, After Applying Global + Per-File Overrides.
#[derive(Debug, Clone)]
pub struct ExpertFileMetadata {
	/// # PNG Compression Level, `1..=9`.
	pub png_level: u8,
	/// # Palette Target Colors, `8..=256`.
	pub pngquant_colors: u16,
	/// # WebP Quality, `10..=100`.
	pub webp_quality: u8,
	/// # AVIF Min Quantizer, `0..=63`.
	pub avif_quality: u8,
	/// # Trim Pass.
	pub trim: TrimSpec,
	/// # Crop Pass.
	pub crop: CropSpec,
}

impl Default for ExpertFileMetadata {
	fn default() -> Self {
		Self {
			png_level: 6,
			pngquant_colors: 128,
			webp_quality: 90,
			avif_quality: 28,
			trim: TrimSpec::default(),
			crop: CropSpec::default(),
		}
	}
}

impl ExpertFileMetadata {
	/// # Apply a JSON Override Object on Top of `self`.
	///
	/// Unknown keys are ignored; out-of-range values are clamped rather
	/// than rejected, matching the core's general "bad params degrade,
	/// they don't 400" posture for optional tuning fields.
	#[must_use]
	pub fn merged_with(mut self, overrides: &Value) -> Self {
		if let Some(v) = overrides.get("pngLevel").and_then(Value::as_u64) {
			self.png_level = (v as u8).clamp(1, 9);
		}
		if let Some(v) = overrides.get("pngQuantColors").and_then(Value::as_u64) {
			self.pngquant_colors = (v as u16).clamp(8, 256);
		}
		if let Some(v) = overrides.get("webpQuality").and_then(Value::as_u64) {
			self.webp_quality = (v as u8).clamp(10, 100);
		}
		if let Some(v) = overrides.get("avifQuality").and_then(Value::as_u64) {
			self.avif_quality = (v as u8).clamp(0, 63);
		}
		if let Some(t) = overrides.get("trim") {
			if let Some(b) = t.get("enabled").and_then(Value::as_bool) { self.trim.enabled = b; }
			if let Some(f) = t.get("tolerance").and_then(Value::as_f64) {
				self.trim.tolerance = (f as f32).clamp(0.0, 1.0);
			}
		}
		if let Some(c) = overrides.get("crop") {
			if let Some(b) = c.get("enabled").and_then(Value::as_bool) { self.crop.enabled = b; }
			if let Some(v) = c.get("x").and_then(Value::as_i64) { self.crop.x = v; }
			if let Some(v) = c.get("y").and_then(Value::as_i64) { self.crop.y = v; }
			if let Some(v) = c.get("width").and_then(Value::as_i64) { self.crop.w = v; }
			if let Some(v) = c.get("height").and_then(Value::as_i64) { self.crop.h = v; }
		}
		self
	}

	/// # Build the Worker's Task List for One File.
	#[must_use]
	pub fn to_job_mode(&self) -> JobMode {
		JobMode::Expert {
			outputs: vec![
				RequestedOutput { format: Format::Png, label: None, png_level: self.png_level, pngquant_colors: self.pngquant_colors, webp_quality: self.webp_quality, avif_quality: self.avif_quality },
				RequestedOutput { format: Format::PngQuant, label: None, png_level: self.png_level, pngquant_colors: self.pngquant_colors, webp_quality: self.webp_quality, avif_quality: self.avif_quality },
				RequestedOutput { format: Format::Webp, label: None, png_level: self.png_level, pngquant_colors: self.pngquant_colors, webp_quality: self.webp_quality, avif_quality: self.avif_quality },
				RequestedOutput { format: Format::Avif, label: None, png_level: self.png_level, pngquant_colors: self.pngquant_colors, webp_quality: self.webp_quality, avif_quality: self.avif_quality },
			],
			trim: self.trim,
			crop: self.crop,
		}
	}
}

/// # One Uploaded File, Resolved Against Global + Per-File Metadata.
#[derive(Debug, Clone)]
pub struct ExpertFile {
	/// # Sanitized Filename.
	pub filename: String,
	/// # Raw Bytes.
	pub bytes: Vec<u8>,
	/// # Resolved Metadata.
	pub metadata: ExpertFileMetadata,
}

const MAX_FILES: usize = 10;
const MAX_FILE_BYTES: usize = 20 * 1024 * 1024;
const MAX_AGGREGATE_BYTES: usize = 100 * 1024 * 1024;

struct RawPart {
	name: String,
	filename: Option<String>,
	body: Vec<u8>,
}

/// # Parse a `multipart/form-data` Body Into Resolved Expert Files.
///
/// Enforces the file-count, per-file, and aggregate limits (§4.7 step 2).
pub fn parse_expert_request(content_type: &str, body: &[u8]) -> Result<Vec<ExpertFile>, HttpError> {
	let boundary = extract_boundary(content_type).ok_or(HttpError::BadRequest("missing multipart boundary"))?;
	let parts = split_parts(&boundary, body)?;

	let global_meta: Value = parts.iter()
		.find(|p| p.name == "metadata")
		.map(|p| serde_json::from_slice(&p.body).unwrap_or(Value::Null))
		.unwrap_or(Value::Null);

	let mut files = Vec::new();
	let mut aggregate = 0usize;

	for part in &parts {
		if part.name != "files" { continue; }
		let filename = sanitize_filename(part.filename.as_deref().unwrap_or("upload.png"));

		if part.body.len() > MAX_FILE_BYTES {
			return Err(HttpError::PayloadTooLarge);
		}
		aggregate += part.body.len();
		if aggregate > MAX_AGGREGATE_BYTES {
			return Err(HttpError::PayloadTooLarge);
		}

		let idx = files.len();
		let per_file_key = format!("metadata[{idx}]");
		let overrides = parts.iter()
			.find(|p| p.name == per_file_key)
			.map(|p| serde_json::from_slice(&p.body).unwrap_or(Value::Null))
			.unwrap_or(Value::Null);

		let metadata = ExpertFileMetadata::default().merged_with(&global_meta).merged_with(&overrides);

		files.push(ExpertFile { filename, bytes: part.body.clone(), metadata });
	}

	if files.is_empty() || files.len() > MAX_FILES {
		return Err(HttpError::BadRequest("expert request must include 1..=10 files"));
	}

	Ok(files)
}

fn extract_boundary(content_type: &str) -> Option<String> {
	content_type.split(';')
		.map(str::trim)
		.find_map(|segment| segment.strip_prefix("boundary="))
		.map(|b| b.trim_matches('"').to_string())
}

fn split_parts(boundary: &str, body: &[u8]) -> Result<Vec<RawPart>, HttpError> {
	let delimiter = format!("--{boundary}").into_bytes();
	let mut parts = Vec::new();

	let mut boundaries = Vec::new();
	let mut cursor = 0;
	while let Some(rel) = find_subslice(&body[cursor..], &delimiter) {
		let pos = cursor + rel;
		boundaries.push(pos);
		cursor = pos + delimiter.len();
	}

	for pair in boundaries.windows(2) {
		let start = pair[0] + delimiter.len();
		let end = pair[1];
		if start >= end || end > body.len() { continue; }
		let chunk = &body[start..end];
		if let Some(part) = parse_one_part(chunk) {
			parts.push(part);
		}
	}

	if parts.is_empty() {
		return Err(HttpError::BadRequest("multipart body has no parts"));
	}
	Ok(parts)
}

fn parse_one_part(chunk: &[u8]) -> Option<RawPart> {
	let sep = find_subslice(chunk, b"\r\n\r\n")?;
	let header_block = std::str::from_utf8(&chunk[..sep]).ok()?;
	let mut body = chunk[sep + 4..].to_vec();
	// Strip the trailing CRLF that precedes the next boundary marker.
	if body.ends_with(b"\r\n") { body.truncate(body.len() - 2); }

	let mut name = None;
	let mut filename = None;
	for line in header_block.split("\r\n") {
		let lower = line.to_ascii_lowercase();
		if !lower.starts_with("content-disposition") { continue; }
		name = extract_quoted(line, "name=");
		filename = extract_quoted(line, "filename=");
	}

	Some(RawPart { name: name?, filename, body })
}

fn extract_quoted(line: &str, key: &str) -> Option<String> {
	let idx = line.find(key)?;
	let rest = &line[idx + key.len()..];
	let rest = rest.strip_prefix('"')?;
	let end = rest.find('"')?;
	Some(rest[..end].to_string())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

/// # Sanitize a Client-Supplied Filename.
///
/// Strips any path component, keeping only the final segment.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
	raw.rsplit(['/', '\\']).next().unwrap_or(raw).to_string()
}

/// # Auth Gate Outcome.
pub enum GateOutcome {
	/// # Allowed, Optionally With a Resolved User Id.
	Allowed { user_id: Option<String>, source: &'static str },
	/// # Denied.
	Denied,
}

/// # Run the Expert Auth Gate (§4.7 step 1).
pub fn gate(
	env_keys: &std::collections::HashSet<String>,
	auth: &dyn AuthStore,
	api_key: Option<&str>,
	bearer: Option<&str>,
	cookie: Option<&str>,
) -> GateOutcome {
	if let Some(key) = api_key {
		if env_keys.contains(key) {
			return GateOutcome::Allowed { user_id: None, source: "env_api_key" };
		}
		if let Some(user) = auth.api_key_allowed(key, "expert") {
			if auth.has_active_subscription(&user.id) {
				return GateOutcome::Allowed { user_id: Some(user.id), source: "api_key" };
			}
			return GateOutcome::Denied;
		}
	}

	for token in [bearer, cookie].into_iter().flatten() {
		if let Some(user) = auth.validate_access(token) {
			if auth.has_active_subscription(&user.id) {
				return GateOutcome::Allowed { user_id: Some(user.id), source: "token" };
			}
			return GateOutcome::Denied;
		}
	}

	if env_keys.is_empty() && api_key.is_none() && bearer.is_none() && cookie.is_none() {
		return GateOutcome::Allowed { user_id: None, source: "dev_mode" };
	}

	GateOutcome::Denied
}

/// # Check the Daily Quota for a Submission.
#[must_use]
pub fn check_quota(usage: &UsageTable, user_id: &str, jobs: u32, bytes: u64) -> QuotaOutcome {
	usage.record(user_id, jobs, bytes)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::NullAuthStore;
	use std::collections::HashSet;

	fn sample_body(boundary: &str) -> Vec<u8> {
		let mut body = Vec::new();
		body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
		body.extend_from_slice(b"Content-Disposition: form-data; name=\"files\"; filename=\"a.png\"\r\n\r\n");
		body.extend_from_slice(b"PNGDATA");
		body.extend_from_slice(b"\r\n");
		body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
		body.extend_from_slice(b"Content-Disposition: form-data; name=\"metadata\"\r\n\r\n");
		body.extend_from_slice(b"{\"pngLevel\":9}");
		body.extend_from_slice(b"\r\n");
		body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
		body
	}

	#[test]
	fn parses_one_file_with_global_metadata() {
		let boundary = "X-FERRET-BOUNDARY";
		let body = sample_body(boundary);
		let content_type = format!("multipart/form-data; boundary={boundary}");
		let files = parse_expert_request(&content_type, &body).unwrap();
		assert_eq!(files.len(), 1);
		assert_eq!(files[0].filename, "a.png");
		assert_eq!(files[0].metadata.png_level, 9);
	}

	#[test]
	fn rejects_missing_boundary() {
		assert!(parse_expert_request("multipart/form-data", b"whatever").is_err());
	}

	#[test]
	fn filename_sanitization_strips_path() {
		assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
		assert_eq!(sanitize_filename("C:\\Users\\a\\pic.png"), "pic.png");
	}

	#[test]
	fn dev_mode_allows_when_nothing_is_configured() {
		let outcome = gate(&HashSet::new(), &NullAuthStore, None, None, None);
		assert!(matches!(outcome, GateOutcome::Allowed { source: "dev_mode", .. }));
	}

	#[test]
	fn env_key_match_allows() {
		let mut keys = HashSet::new();
		keys.insert("foo".to_string());
		let outcome = gate(&keys, &NullAuthStore, Some("foo"), None, None);
		assert!(matches!(outcome, GateOutcome::Allowed { source: "env_api_key", .. }));
	}

	#[test]
	fn env_keys_configured_but_no_credentials_denies() {
		let mut keys = HashSet::new();
		keys.insert("foo".to_string());
		let outcome = gate(&keys, &NullAuthStore, None, None, None);
		assert!(matches!(outcome, GateOutcome::Denied));
	}
}
