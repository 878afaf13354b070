/*!
# Ferret: Expert Daily Usage (part of C7)

A small fixed-capacity table tracking `(user_id, day)` usage against the
Expert daily quota (§4.7 step 3: 500 jobs / 2 GiB per user per day),
guarded by one mutex — the same "single mutex over a small fixed slot
array" shape as the progress registry and result side-cache. Unlike
those, entries here are allowed to silently evict the oldest slot rather
than grow: usage state is advisory rate-limiting, not correctness-
critical, so losing a rarely-active user's counter a day early just
resets their quota slightly ahead of schedule.
*/

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// # Daily Job Quota.
pub const MAX_JOBS_PER_DAY: u32 = 500;
/// # Daily Byte Quota (2 GiB).
pub const MAX_BYTES_PER_DAY: u64 = 2 * 1024 * 1024 * 1024;

const CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
	user_id: String,
	day: u64,
	jobs: u32,
	bytes: u64,
	inserted_order: u64,
}

struct State {
	slots: Vec<Option<Entry>>,
	next_order: u64,
}

/// # Expert Usage Table.
pub struct UsageTable {
	state: Mutex<State>,
}

/// # Quota Check Outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
	/// # Request Fits Within Today's Remaining Quota.
	Allowed,
	/// # Request Would Exceed the Daily Job or Byte Cap.
	Exceeded,
}

impl UsageTable {
	#[must_use]
	/// # New, Empty Table.
	pub fn new() -> Self {
		Self { state: Mutex::new(State { slots: vec![None; CAPACITY], next_order: 0 }) }
	}

	/// # Record a Submission and Check the Quota.
	///
	/// Adds `jobs`/`bytes` to today's running total for `user_id` and
	/// reports whether the *post-add* total still fits under the cap.
	/// Callers should reject the request (429) when this returns
	/// [`QuotaOutcome::Exceeded`], but the usage is still recorded — a
	/// rejected burst still counts against the user, matching the "hard
	/// cap" framing in §4.7.
	pub fn record(&self, user_id: &str, jobs: u32, bytes: u64) -> QuotaOutcome {
		let day = today();
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

		let idx = find_or_insert(&mut state, user_id, day);
		let entry = state.slots[idx].as_mut().expect("just inserted");
		entry.jobs = entry.jobs.saturating_add(jobs);
		entry.bytes = entry.bytes.saturating_add(bytes);

		if entry.jobs > MAX_JOBS_PER_DAY || entry.bytes > MAX_BYTES_PER_DAY {
			QuotaOutcome::Exceeded
		} else {
			QuotaOutcome::Allowed
		}
	}
}

impl Default for UsageTable {
	fn default() -> Self { Self::new() }
}

fn find_or_insert(state: &mut State, user_id: &str, day: u64) -> usize {
	if let Some(idx) = state.slots.iter().position(|e| {
		e.as_ref().is_some_and(|e| e.user_id == user_id && e.day == day)
	}) {
		return idx;
	}

	if let Some(idx) = state.slots.iter().position(Option::is_none) {
		state.slots[idx] = Some(Entry {
			user_id: user_id.to_string(), day, jobs: 0, bytes: 0,
			inserted_order: next_order(state),
		});
		return idx;
	}

	// Table is full: evict the oldest entry by insertion order.
	let oldest = state.slots.iter().enumerate()
		.min_by_key(|(_, e)| e.as_ref().map_or(u64::MAX, |e| e.inserted_order))
		.map(|(idx, _)| idx)
		.expect("capacity is nonzero");

	state.slots[oldest] = Some(Entry {
		user_id: user_id.to_string(), day, jobs: 0, bytes: 0,
		inserted_order: next_order(state),
	});
	oldest
}

fn next_order(state: &mut State) -> u64 {
	let order = state.next_order;
	state.next_order += 1;
	order
}

fn today() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() / 86_400)
		.unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stays_allowed_under_the_cap() {
		let table = UsageTable::new();
		assert_eq!(table.record("user-1", 1, 1024), QuotaOutcome::Allowed);
	}

	#[test]
	fn exceeds_job_cap() {
		let table = UsageTable::new();
		assert_eq!(table.record("user-1", MAX_JOBS_PER_DAY + 1, 0), QuotaOutcome::Exceeded);
	}

	#[test]
	fn exceeds_byte_cap() {
		let table = UsageTable::new();
		assert_eq!(table.record("user-1", 1, MAX_BYTES_PER_DAY + 1), QuotaOutcome::Exceeded);
	}

	#[test]
	fn distinct_users_have_independent_counters() {
		let table = UsageTable::new();
		table.record("user-1", MAX_JOBS_PER_DAY, 0);
		assert_eq!(table.record("user-2", 1, 0), QuotaOutcome::Allowed);
	}

	#[test]
	fn table_evicts_oldest_when_full() {
		let table = UsageTable::new();
		for i in 0..CAPACITY {
			table.record(&format!("user-{i}"), 1, 0);
		}
		// One more distinct user forces an eviction rather than panicking.
		assert_eq!(table.record("user-overflow", 1, 0), QuotaOutcome::Allowed);
	}
}
