/*!
# Ferret: SSE Streaming (part of C6)

`GET /api/jobs/<id>/events` upgrades the response to Server-Sent Events.
A subscriber may connect slightly before the worker registers the
channel (the client opened the stream first, then POSTed the job), so
the registry is polled for up to ~10 s before giving up with a 404.
*/

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::error::HttpError;
use crate::logging::Logger;
use crate::progress::Registry;

use super::response::{write_sse_event, write_sse_headers};

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const ACQUIRE_POLL_ATTEMPTS: u32 = 200;
const ACQUIRE_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// # Serve an SSE Stream for `job_id`.
///
/// Blocks the calling (per-connection) thread until the channel closes
/// and drains, or the client disconnects (observed as a write failure).
pub fn serve<W: Write>(w: &mut W, registry: &Arc<Registry>, job_id: u64, logger: &dyn Logger) -> Result<(), HttpError> {
	let handle = match registry.acquire_wait(job_id, ACQUIRE_TOTAL_TIMEOUT, ACQUIRE_POLL_INTERVAL)
		.or_else(|| poll_fallback(registry, job_id))
	{
		Some(handle) => handle,
		None => {
			logger.warn_with_job(job_id, "no progress channel after acquire wait; giving up with 404");
			return Err(HttpError::NotFound);
		},
	};

	write_sse_headers(w).map_err(|_| HttpError::Internal("client disconnected"))?;

	loop {
		let (event, is_open) = handle.next_event_timeout(READ_TIMEOUT);

		if let Some(event) = event {
			if write_sse_event(w, event.kind.as_str(), &event.payload).is_err() {
				return Ok(());
			}
		}

		if !is_open { return Ok(()); }
	}
}

/// # Belt-and-Suspenders Retry.
///
/// `Registry::acquire_wait` already polls internally; this exists so a
/// caller using a registry whose `acquire_wait` window is shorter than
/// `ACQUIRE_TOTAL_TIMEOUT` (e.g. a custom-configured registry) still gets
/// the full ~10 s / 200-attempt budget described in §4.6.
fn poll_fallback(registry: &Arc<Registry>, job_id: u64) -> Option<crate::progress::ProgressHandle> {
	for _ in 0..ACQUIRE_POLL_ATTEMPTS {
		if let Some(h) = registry.acquire(job_id) { return Some(h); }
		std::thread::sleep(ACQUIRE_POLL_INTERVAL);
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::logging::TracingLogger;
	use crate::progress::{EventKind, ProgressEvent};
	use serde_json::json;
	use std::thread;

	#[test]
	fn streams_events_then_closes() {
		let registry = Registry::new(8);
		let handle = registry.register(1);

		let writer_thread = {
			let registry = Arc::clone(&registry);
			thread::spawn(move || {
				let mut buf = Vec::new();
				serve(&mut buf, &registry, 1, &TracingLogger).unwrap();
				buf
			})
		};

		handle.emit(ProgressEvent::new(EventKind::Output, json!({"ok": true})));
		handle.close();

		let buf = writer_thread.join().unwrap();
		let text = String::from_utf8(buf).unwrap();
		assert!(text.starts_with("HTTP/1.1 200 OK"));
		assert!(text.contains("event: result"));
	}

	#[test]
	fn unregistered_job_has_nothing_to_acquire() {
		// The full ~10s wait-then-404 path is covered by an integration
		// test rather than here, to keep the unit suite fast.
		let registry = Registry::new(8);
		assert!(registry.acquire(999).is_none());
	}
}
