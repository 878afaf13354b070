/*!
# Ferret: HTTP Response Writer (part of C6)

No keep-alive, no chunked transfer encoding: every response either writes
a `Content-Length`-delimited body and closes, or (for SSE) writes headers
once and then streams events until the channel closes.
*/

use std::io::{self, Write};

use serde_json::Value;

use crate::error::HttpError;

/// # Write a Full Response With a Known-Length Body.
pub fn write_response<W: Write>(w: &mut W, status: u16, content_type: &str, body: &[u8]) -> io::Result<()> {
	write!(
		w,
		"HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
		reason = reason_phrase(status),
		len = body.len(),
	)?;
	w.write_all(body)
}

/// # Write a JSON Body.
pub fn write_json<W: Write>(w: &mut W, status: u16, value: &Value) -> io::Result<()> {
	let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
	write_response(w, status, "application/json", &body)
}

/// # Write an [`HttpError`] as the Standard `{"status":"error","message":"<code>"}` Envelope.
pub fn write_error<W: Write>(w: &mut W, err: &HttpError) -> io::Result<()> {
	write_json(w, err.status(), &serde_json::json!({ "status": "error", "message": err.message() }))
}

/// # Begin an SSE Stream.
///
/// Caller keeps writing `event: <name>\ndata: <payload>\n\n` frames to the
/// same writer afterward.
pub fn write_sse_headers<W: Write>(w: &mut W) -> io::Result<()> {
	write!(
		w,
		"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n",
	)
}

/// # Write One SSE Frame.
pub fn write_sse_event<W: Write>(w: &mut W, event: &str, data: &Value) -> io::Result<()> {
	write!(w, "event: {event}\ndata: {}\n\n", data)?;
	w.flush()
}

const fn reason_phrase(status: u16) -> &'static str {
	match status {
		200 => "OK",
		400 => "Bad Request",
		401 => "Unauthorized",
		404 => "Not Found",
		413 => "Payload Too Large",
		429 => "Too Many Requests",
		500 => "Internal Server Error",
		501 => "Not Implemented",
		503 => "Service Unavailable",
		_ => "Unknown",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn writes_status_line_and_body() {
		let mut buf = Vec::new();
		write_response(&mut buf, 200, "text/plain", b"hi").unwrap();
		let text = String::from_utf8(buf).unwrap();
		assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
		assert!(text.ends_with("hi"));
		assert!(text.contains("Content-Length: 2"));
	}

	#[test]
	fn error_envelope_has_status_and_message() {
		let mut buf = Vec::new();
		write_error(&mut buf, &HttpError::NotFound).unwrap();
		let text = String::from_utf8(buf).unwrap();
		assert!(text.contains("404"));
		assert!(text.contains("not_found"));
	}
}
