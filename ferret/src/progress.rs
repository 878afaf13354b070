/*!
# Ferret: Progress Registry & Channels (C2)

Maps `job_id -> channel`, fanning encoder/worker events out to a single
SSE subscriber. The registry is guarded by one mutex (slot assignment and
teardown); each channel has its own mutex + condvar for its event FIFO and
closed flag, so a slow reader on one job never blocks another job's
producer.

Reference counting is reified as [`ProgressHandle`], an owned,
`Clone`-able handle whose `Drop` releases the reference. The registry
never frees anything out from under a live handle — the last `Drop`
(refcount hitting zero) is what removes the slot.
*/

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Progress Event Kind.
pub enum EventKind {
	/// # One Encoder Finished.
	Output,
	/// # Terminal Job Status.
	Status,
}

impl EventKind {
	#[must_use]
	/// # SSE `event:` Name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Output => "result",
			Self::Status => "status",
		}
	}
}

#[derive(Debug, Clone)]
/// # One Progress Event.
pub struct ProgressEvent {
	/// # Kind.
	pub kind: EventKind,
	/// # JSON Payload.
	pub payload: Value,
}

impl ProgressEvent {
	#[must_use]
	/// # New.
	pub const fn new(kind: EventKind, payload: Value) -> Self { Self { kind, payload } }
}

struct ChannelState {
	events: VecDeque<ProgressEvent>,
	closed: bool,
}

struct ChannelInner {
	state: Mutex<ChannelState>,
	cond: Condvar,
}

impl ChannelInner {
	fn new() -> Self {
		Self { state: Mutex::new(ChannelState { events: VecDeque::new(), closed: false }), cond: Condvar::new() }
	}

	/// # Emit.
	///
	/// Dropped silently if the channel is already closed.
	fn emit(&self, event: ProgressEvent) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.closed { return; }
		state.events.push_back(event);
		self.cond.notify_all();
	}

	/// # Close.
	///
	/// Idempotent; the closed flag is only ever set, never cleared.
	fn close(&self) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.closed = true;
		self.cond.notify_all();
	}

	/// # Next Event, Blocking.
	///
	/// Returns `(event, is_open)`. `event` is `None` only when the channel
	/// is closed and drained; `is_open` is `false` in exactly that case.
	fn next_event(&self) -> (Option<ProgressEvent>, bool) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		loop {
			if let Some(ev) = state.events.pop_front() {
				return (Some(ev), true);
			}
			if state.closed { return (None, false); }
			state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
		}
	}

	/// # Next Event, Bounded Wait.
	///
	/// As [`ChannelInner::next_event`] but gives up after `timeout`,
	/// returning `(None, true)` to mean "still open, nothing yet".
	fn next_event_timeout(&self, timeout: Duration) -> (Option<ProgressEvent>, bool) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		let deadline = Instant::now() + timeout;
		loop {
			if let Some(ev) = state.events.pop_front() {
				return (Some(ev), true);
			}
			if state.closed { return (None, false); }
			let now = Instant::now();
			if now >= deadline { return (None, true); }
			let (s, _timed_out) = self.cond.wait_timeout(state, deadline - now).unwrap_or_else(|e| e.into_inner());
			state = s;
		}
	}
}

struct Entry {
	job_id: u64,
	channel: Arc<ChannelInner>,
	refcount: usize,
}

struct RegistryState {
	slots: Vec<Option<Entry>>,
}

impl RegistryState {
	fn index(&self, job_id: u64) -> usize {
		if self.slots.is_empty() { 0 } else { (job_id % self.slots.len() as u64) as usize }
	}

	/// # Find an Existing Entry's Slot Index.
	///
	/// Scans all `len` slots rather than stopping at the first hole:
	/// `release` clears a slot to `None` without tombstoning or
	/// compacting, so an entry that originally collided past a
	/// since-vacated home slot can still be reachable further along the
	/// probe sequence.
	fn find(&self, job_id: u64) -> Option<usize> {
		let len = self.slots.len();
		if len == 0 { return None; }
		let start = self.index(job_id);
		for probe in 0..len {
			let idx = (start + probe) % len;
			if let Some(e) = &self.slots[idx] {
				if e.job_id == job_id { return Some(idx); }
			}
		}
		None
	}

	/// # Find a Free Slot for Insertion, Linear-Probing From `job_id`'s Home.
	fn find_free(&self, job_id: u64) -> Option<usize> {
		let len = self.slots.len();
		if len == 0 { return None; }
		let start = self.index(job_id);
		for probe in 0..len {
			let idx = (start + probe) % len;
			if self.slots[idx].is_none() { return Some(idx); }
		}
		None
	}

	/// # Double Capacity and Rehash.
	fn grow(&mut self) {
		let new_len = (self.slots.len() * 2).max(64);
		let old = std::mem::replace(&mut self.slots, (0..new_len).map(|_| None).collect());
		for entry in old.into_iter().flatten() {
			let idx = {
				let start = self.index(entry.job_id);
				(0..new_len).map(|p| (start + p) % new_len)
					.find(|&i| self.slots[i].is_none())
					.expect("freshly doubled table always has room")
			};
			self.slots[idx] = Some(entry);
		}
	}
}

/// # Progress Registry.
pub struct Registry {
	inner: Mutex<RegistryState>,
}

impl Registry {
	#[must_use]
	/// # New.
	pub fn new(capacity: usize) -> Arc<Self> {
		let capacity = capacity.max(1);
		Arc::new(Self { inner: Mutex::new(RegistryState { slots: (0..capacity).map(|_| None).collect() }) })
	}

	/// # Register.
	///
	/// Allocates a fresh channel with refcount 1. The registry grows
	/// (doubles) under its own lock if every slot is occupied rather than
	/// refusing the registration — sizing is a tuning knob, not a hard
	/// cap.
	pub fn register(self: &Arc<Self>, job_id: u64) -> ProgressHandle {
		let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		let idx = loop {
			if let Some(idx) = state.find_free(job_id) { break idx; }
			state.grow();
		};
		let channel = Arc::new(ChannelInner::new());
		state.slots[idx] = Some(Entry { job_id, channel: Arc::clone(&channel), refcount: 1 });
		drop(state);

		ProgressHandle { registry: Arc::clone(self), job_id, channel }
	}

	/// # Acquire.
	///
	/// Finds an existing channel and increments its refcount. Returns
	/// `None` if no job with this id is currently registered.
	pub fn acquire(self: &Arc<Self>, job_id: u64) -> Option<ProgressHandle> {
		let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		let idx = state.find(job_id)?;
		let entry = state.slots[idx].as_mut().unwrap();
		entry.refcount += 1;
		let channel = Arc::clone(&entry.channel);
		drop(state);

		Some(ProgressHandle { registry: Arc::clone(self), job_id, channel })
	}

	/// # Poll-Acquire.
	///
	/// Repeatedly [`Registry::acquire`]s until it succeeds or `timeout`
	/// elapses, sleeping `interval` between attempts — the SSE handler's
	/// "subscriber arrived slightly early" accommodation from §4.6.
	pub fn acquire_wait(self: &Arc<Self>, job_id: u64, timeout: Duration, interval: Duration) -> Option<ProgressHandle> {
		let deadline = Instant::now() + timeout;
		loop {
			if let Some(h) = self.acquire(job_id) { return Some(h); }
			if Instant::now() >= deadline { return None; }
			std::thread::sleep(interval);
		}
	}

	fn retain(&self, job_id: u64) {
		let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(idx) = state.find(job_id) {
			state.slots[idx].as_mut().unwrap().refcount += 1;
		}
	}

	fn release(&self, job_id: u64) {
		let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(idx) = state.find(job_id) {
			let entry = state.slots[idx].as_mut().unwrap();
			entry.refcount -= 1;
			if entry.refcount == 0 { state.slots[idx] = None; }
		}
	}
}

/// # Progress Handle.
///
/// An owned, reference-counted reference to a job's progress channel.
/// Cloning retains (bumps refcount); dropping releases. The channel is
/// torn down from the registry exactly when the last handle drops.
pub struct ProgressHandle {
	registry: Arc<Registry>,
	job_id: u64,
	channel: Arc<ChannelInner>,
}

impl ProgressHandle {
	#[must_use]
	/// # Job Id.
	pub const fn job_id(&self) -> u64 { self.job_id }

	/// # Emit.
	pub fn emit(&self, event: ProgressEvent) { self.channel.emit(event); }

	/// # Close.
	pub fn close(&self) { self.channel.close(); }

	#[must_use]
	/// # Next Event, Blocking Until Ready or Closed.
	pub fn next_event(&self) -> (Option<ProgressEvent>, bool) { self.channel.next_event() }

	#[must_use]
	/// # Next Event, Bounded Wait.
	pub fn next_event_timeout(&self, timeout: Duration) -> (Option<ProgressEvent>, bool) {
		self.channel.next_event_timeout(timeout)
	}
}

impl Clone for ProgressHandle {
	fn clone(&self) -> Self {
		self.registry.retain(self.job_id);
		Self { registry: Arc::clone(&self.registry), job_id: self.job_id, channel: Arc::clone(&self.channel) }
	}
}

impl Drop for ProgressHandle {
	fn drop(&mut self) { self.registry.release(self.job_id); }
}

impl std::fmt::Debug for ProgressHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProgressHandle").field("job_id", &self.job_id).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;

	#[test]
	fn register_then_emit_then_close_is_observed_in_order() {
		let registry = Registry::new(8);
		let handle = registry.register(42);

		handle.emit(ProgressEvent::new(EventKind::Output, serde_json::json!({"n": 1})));
		handle.emit(ProgressEvent::new(EventKind::Output, serde_json::json!({"n": 2})));
		handle.close();

		let (e1, open1) = handle.next_event();
		assert!(open1);
		assert_eq!(e1.unwrap().payload["n"], 1);

		let (e2, open2) = handle.next_event();
		assert!(open2);
		assert_eq!(e2.unwrap().payload["n"], 2);

		let (e3, open3) = handle.next_event();
		assert!(e3.is_none());
		assert!(!open3);
	}

	#[test]
	fn events_after_close_are_dropped() {
		let registry = Registry::new(8);
		let handle = registry.register(7);
		handle.close();
		handle.emit(ProgressEvent::new(EventKind::Status, serde_json::json!({})));
		let (ev, open) = handle.next_event();
		assert!(ev.is_none());
		assert!(!open);
	}

	#[test]
	fn acquire_missing_job_returns_none() {
		let registry = Registry::new(8);
		assert!(registry.acquire(999).is_none());
	}

	#[test]
	fn refcount_teardown_on_last_drop() {
		let registry = Registry::new(8);
		let h1 = registry.register(5);
		let h2 = registry.acquire(5).expect("should find it while h1 lives");
		drop(h1);
		// h2 still alive, so acquire should still find it.
		assert!(registry.acquire(5).is_some());
		drop(h2);
		// Now all handles are gone (aside from the one we just got back,
		// drop it too).
		let h3 = registry.acquire(5);
		assert!(h3.is_some());
		drop(h3);
		assert!(registry.acquire(5).is_none());
	}

	#[test]
	fn collided_entry_survives_release_of_its_home_slot() {
		// Capacity 2: job 2 homes at idx 0, job 4 collides and lands at
		// idx 1. Releasing job 2 clears idx 0 to `None` without
		// compacting, so acquiring job 4 must probe past that hole
		// instead of stopping at it.
		let registry = Registry::new(2);
		let h2 = registry.register(2);
		let h4 = registry.register(4);
		drop(h2);

		assert!(registry.acquire(4).is_some());
		drop(h4);
	}

	#[test]
	fn grows_instead_of_rejecting_when_full() {
		let registry = Registry::new(2);
		let mut handles = Vec::new();
		for id in 1..=10u64 {
			handles.push(registry.register(id));
		}
		for id in 1..=10u64 {
			assert!(registry.acquire(id).is_some());
		}
	}

	#[test]
	fn blocked_reader_wakes_on_emit() {
		let registry = Registry::new(8);
		let handle = registry.register(1);
		let reader = registry.acquire(1).unwrap();

		let t = thread::spawn(move || reader.next_event());
		thread::sleep(std::time::Duration::from_millis(20));
		handle.emit(ProgressEvent::new(EventKind::Status, serde_json::json!({"ok": true})));
		handle.close();

		let (ev, open) = t.join().unwrap();
		assert!(open);
		assert_eq!(ev.unwrap().payload["ok"], true);
	}
}
