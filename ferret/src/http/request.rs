/*!
# Ferret: HTTP/1.1 Request Parsing (part of C6)

One request per connection, no keep-alive. The header block is read into
a buffer that grows by doubling up to a hard 64 KiB cap; the body is then
read exactly by `Content-Length` up to a hard 100 MiB cap. Both caps exist
so a slow or hostile client can't force unbounded allocation before the
request has even been validated.
*/

use std::collections::HashMap;
use std::io::Read;

use crate::error::HttpError;

const HEADER_CAP: usize = 64 * 1024;
const BODY_CAP: usize = 100 * 1024 * 1024;
const INITIAL_HEADER_BUF: usize = 4096;

/// # Recognized Headers.
///
/// Only this fixed set is case-folded and retained; everything else in
/// the wire request is read (it has to be, to find the header/body
/// boundary) but discarded.
const RECOGNIZED: [&str; 8] = [
	"content-length", "content-type", "x-filename", "x-job-id",
	"x-tune-format", "x-tune-label", "x-tune-intent", "authorization",
];

#[derive(Debug, Clone)]
/// # A Parsed Request Line + Headers + Body.
pub struct Request {
	/// # HTTP Method, e.g. `"GET"`.
	pub method: String,
	/// # Request-Target Path (no query string handling needed by this service).
	pub path: String,
	/// # Case-Folded Recognized Headers.
	pub headers: HashMap<String, String>,
	/// # `Cookie` Header, Parsed Into Name/Value Pairs.
	pub cookies: HashMap<String, String>,
	/// # Body Bytes, Read Exactly by `Content-Length`.
	pub body: Vec<u8>,
}

impl Request {
	#[must_use]
	/// # Header Lookup (Case-Insensitive by Construction).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).map(String::as_str)
	}
}

/// # Read and Parse One Request From a Blocking Stream.
pub fn read_request<R: Read>(stream: &mut R) -> Result<Request, HttpError> {
	let (head, leftover) = read_header_block(stream)?;
	let (method, path, headers, raw_cookie) = parse_head(&head)?;

	let content_length: usize = headers.get("content-length")
		.map(|v| v.parse::<usize>().map_err(|_| HttpError::BadRequest("bad Content-Length")))
		.transpose()?
		.unwrap_or(0);

	if content_length > BODY_CAP {
		return Err(HttpError::PayloadTooLarge);
	}

	let body = read_body_exact(stream, leftover, content_length)?;
	let cookies = parse_cookies(raw_cookie.as_deref());

	Ok(Request { method, path, headers, cookies, body })
}

/// # Read the Header Block, Growing the Buffer by Doubling Up to `HEADER_CAP`.
///
/// Returns `(header_bytes_without_trailing_blank_line_terminator, leftover_body_bytes_already_read)`.
fn read_header_block<R: Read>(stream: &mut R) -> Result<(Vec<u8>, Vec<u8>), HttpError> {
	let mut buf = vec![0u8; INITIAL_HEADER_BUF];
	let mut filled = 0usize;

	loop {
		if filled == buf.len() {
			if buf.len() >= HEADER_CAP {
				return Err(HttpError::BadRequest("header block exceeds 64 KiB"));
			}
			let new_len = (buf.len() * 2).min(HEADER_CAP);
			buf.resize(new_len, 0);
		}

		let n = stream.read(&mut buf[filled..]).map_err(|_| HttpError::Internal("read error"))?;
		if n == 0 { break; }
		filled += n;

		if let Some(end) = find_subslice(&buf[..filled], b"\r\n\r\n") {
			let head = buf[..end].to_vec();
			let leftover = buf[end + 4..filled].to_vec();
			return Ok((head, leftover));
		}

		if filled >= HEADER_CAP {
			return Err(HttpError::BadRequest("header block exceeds 64 KiB"));
		}
	}

	Err(HttpError::BadRequest("connection closed before headers completed"))
}

fn parse_head(head: &[u8]) -> Result<(String, String, HashMap<String, String>, Option<String>), HttpError> {
	let text = std::str::from_utf8(head).map_err(|_| HttpError::BadRequest("non-UTF-8 headers"))?;
	let mut lines = text.split("\r\n");

	let request_line = lines.next().ok_or(HttpError::BadRequest("missing request line"))?;
	let mut parts = request_line.split(' ');
	let method = parts.next().ok_or(HttpError::BadRequest("missing method"))?.to_uppercase();
	let path = parts.next().ok_or(HttpError::BadRequest("missing path"))?.to_string();

	let mut headers = HashMap::new();
	let mut raw_cookie = None;

	for line in lines {
		if line.is_empty() { continue; }
		let Some((name, value)) = line.split_once(':') else { continue; };
		let name = name.trim().to_ascii_lowercase();
		let value = value.trim().to_string();

		if name == "cookie" { raw_cookie = Some(value); continue; }
		if RECOGNIZED.contains(&name.as_str()) { headers.insert(name, value); }
	}

	Ok((method, path, headers, raw_cookie))
}

fn read_body_exact<R: Read>(stream: &mut R, leftover: Vec<u8>, content_length: usize) -> Result<Vec<u8>, HttpError> {
	let mut body = leftover;
	if body.len() > content_length {
		body.truncate(content_length);
		return Ok(body);
	}

	body.reserve(content_length.saturating_sub(body.len()));
	let mut remaining = content_length - body.len();
	let mut chunk = [0u8; 64 * 1024];

	while remaining > 0 {
		let want = remaining.min(chunk.len());
		let n = stream.read(&mut chunk[..want]).map_err(|_| HttpError::Internal("read error"))?;
		if n == 0 { return Err(HttpError::BadRequest("body shorter than Content-Length")); }
		body.extend_from_slice(&chunk[..n]);
		remaining -= n;
	}

	Ok(body)
}

fn parse_cookies(raw: Option<&str>) -> HashMap<String, String> {
	let mut out = HashMap::new();
	let Some(raw) = raw else { return out; };
	for pair in raw.split(';') {
		if let Some((k, v)) = pair.trim().split_once('=') {
			out.insert(k.trim().to_string(), v.trim().to_string());
		}
	}
	out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn parses_method_path_headers_and_body() {
		let raw = b"POST /api/compress HTTP/1.1\r\nContent-Length: 5\r\nX-Filename: a.png\r\n\r\nhello";
		let mut cursor = Cursor::new(raw.to_vec());
		let req = read_request(&mut cursor).unwrap();
		assert_eq!(req.method, "POST");
		assert_eq!(req.path, "/api/compress");
		assert_eq!(req.header("x-filename"), Some("a.png"));
		assert_eq!(req.body, b"hello");
	}

	#[test]
	fn parses_cookie_pairs() {
		let raw = b"GET / HTTP/1.1\r\nCookie: fp_access=abc; other=1\r\n\r\n";
		let mut cursor = Cursor::new(raw.to_vec());
		let req = read_request(&mut cursor).unwrap();
		assert_eq!(req.cookies.get("fp_access"), Some(&"abc".to_string()));
	}

	#[test]
	fn rejects_content_length_over_cap() {
		let raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", BODY_CAP + 1);
		let mut cursor = Cursor::new(raw.into_bytes());
		let err = read_request(&mut cursor).unwrap_err();
		assert_eq!(err.status(), 413);
	}

	#[test]
	fn empty_body_is_empty_vec() {
		let raw = b"POST /api/compress HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
		let mut cursor = Cursor::new(raw.to_vec());
		let req = read_request(&mut cursor).unwrap();
		assert!(req.body.is_empty());
	}
}
