/*!
# Ferret: ETA Model (part of C5)

A crash-consistent, append-only log of `(key, elapsed_ms, work_units)`
samples backs an in-memory aggregate keyed by `<encoder>_<bucket>`, where
`bucket` is the work size rounded to quarter-megapixel granularity. All
reads/writes go through one mutex so an append and the in-memory update it
represents are never observed out of step (§4.5).

The table is a fixed 8-slot array, not an unbounded map — same "single
mutex over a small fixed slot array, oldest evicted when full" shape as
[`crate::usage::UsageTable`]. With 4 encoders and dozens of work-size
buckets there are far more distinct keys than 8 slots, so keys are
expected to collide and blend into whichever slot they land in or evict;
the estimate is deliberately an approximation, not a per-bucket exact
average.
*/

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

const MAX_BUCKET: u32 = 128;
const CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
struct Aggregate {
	total_ms: u64,
	total_work_units: f64,
	samples: u64,
}

impl Aggregate {
	fn add(&mut self, elapsed_ms: u64, work_units: f64) {
		self.total_ms += elapsed_ms;
		self.total_work_units += work_units;
		self.samples += 1;
	}

	fn eta_ms(&self, work_units: f64) -> u64 {
		if self.total_work_units <= 0.0 { return 0; }
		((self.total_ms as f64 / self.total_work_units) * work_units).round().max(0.0) as u64
	}
}

#[derive(Debug, Clone)]
struct Entry {
	key: String,
	aggregate: Aggregate,
	inserted_order: u64,
}

struct State {
	slots: Vec<Option<Entry>>,
	next_order: u64,
	log: Option<File>,
}

/// # Find `key`'s Slot, Inserting Into a Free Slot or Evicting the Oldest.
fn find_or_insert(state: &mut State, key: &str) -> usize {
	if let Some(idx) = state.slots.iter().position(|e| e.as_ref().is_some_and(|e| e.key == key)) {
		return idx;
	}

	if let Some(idx) = state.slots.iter().position(Option::is_none) {
		let order = state.next_order;
		state.next_order += 1;
		state.slots[idx] = Some(Entry { key: key.to_string(), aggregate: Aggregate::default(), inserted_order: order });
		return idx;
	}

	let oldest = state.slots.iter().enumerate()
		.min_by_key(|(_, e)| e.as_ref().map_or(u64::MAX, |e| e.inserted_order))
		.map(|(idx, _)| idx)
		.expect("capacity is nonzero");

	let order = state.next_order;
	state.next_order += 1;
	state.slots[oldest] = Some(Entry { key: key.to_string(), aggregate: Aggregate::default(), inserted_order: order });
	oldest
}

/// # ETA Store.
///
/// One process-wide instance, shared via `Arc`, feeding both the worker
/// pool (writer) and the progress stream (reader).
pub struct EtaStore {
	state: Mutex<State>,
}

impl EtaStore {
	/// # Open, Replaying Any Existing Log.
	///
	/// `path` is optional; with `None` the store is purely in-memory (used
	/// in tests and ephemeral deployments).
	pub fn open(path: Option<&Path>) -> io::Result<Self> {
		let mut state = State { slots: vec![None; CAPACITY], next_order: 0, log: None };

		if let Some(p) = path {
			if let Ok(file) = File::open(p) {
				for line in BufReader::new(file).lines() {
					let line = line?;
					if let Some((key, ms, wu)) = parse_line(&line) {
						let idx = find_or_insert(&mut state, &key);
						state.slots[idx].as_mut().expect("just inserted").aggregate.add(ms, wu);
					}
				}
			}
		}

		state.log = match path {
			Some(p) => Some(OpenOptions::new().create(true).append(true).open(p)?),
			None => None,
		};

		Ok(Self { state: Mutex::new(state) })
	}

	/// # In-Memory Only, No Persistence.
	#[must_use]
	pub fn in_memory() -> Self {
		Self { state: Mutex::new(State { slots: vec![None; CAPACITY], next_order: 0, log: None }) }
	}

	/// # Bucket Key for an Encoder at a Given Work Size.
	#[must_use]
	pub fn key(encoder: &str, work_units: f64) -> String {
		format!("{encoder}_{}", bucket(work_units))
	}

	/// # Record a Completed Encode.
	///
	/// Appends to the log (if any) under the same lock as the in-memory
	/// update, so a reader never sees the aggregate without the append
	/// that produced it having already landed on disk.
	pub fn record(&self, encoder: &str, elapsed_ms: u64, work_units: f64) -> io::Result<()> {
		let key = Self::key(encoder, work_units);
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

		if let Some(log) = state.log.as_mut() {
			writeln!(log, "{key}\t{elapsed_ms}\t{work_units}")?;
			log.flush()?;
		}

		let idx = find_or_insert(&mut state, &key);
		state.slots[idx].as_mut().expect("just inserted").aggregate.add(elapsed_ms, work_units);
		Ok(())
	}

	/// # Estimate, in Milliseconds, for an Encoder at a Given Work Size.
	///
	/// `0` if no samples exist yet for that bucket, or if the bucket's slot
	/// has since been evicted by a more recent, unrelated key.
	#[must_use]
	pub fn estimate(&self, encoder: &str, work_units: f64) -> u64 {
		let key = Self::key(encoder, work_units);
		let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.slots.iter()
			.find_map(|e| e.as_ref().filter(|e| e.key == key))
			.map_or(0, |e| e.aggregate.eta_ms(work_units))
	}
}

fn bucket(work_units: f64) -> u32 {
	let raw = (work_units * 4.0).round();
	if raw.is_sign_negative() || raw.is_nan() { return 0; }
	(raw as u32).min(MAX_BUCKET)
}

fn parse_line(line: &str) -> Option<(String, u64, f64)> {
	let mut parts = line.splitn(3, '\t');
	let key = parts.next()?.to_string();
	let ms: u64 = parts.next()?.parse().ok()?;
	let wu: f64 = parts.next()?.parse().ok()?;
	Some((key, ms, wu))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bucket_clamps_and_rounds() {
		assert_eq!(bucket(0.0), 0);
		assert_eq!(bucket(1.0), 4);
		assert_eq!(bucket(1000.0), MAX_BUCKET);
	}

	#[test]
	fn estimate_is_zero_with_no_samples() {
		let store = EtaStore::in_memory();
		assert_eq!(store.estimate("webp", 2.0), 0);
	}

	#[test]
	fn estimate_scales_linearly_with_work_units() {
		let store = EtaStore::in_memory();
		store.record("png", 100, 1.0).unwrap();
		store.record("png", 100, 1.0).unwrap();
		let eta = store.estimate("png", 1.0);
		assert_eq!(eta, 100);
	}

	#[test]
	fn log_replays_across_reopen() {
		let dir = std::env::temp_dir().join(format!("ferret_eta_test_{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let path = dir.join("eta.log");

		{
			let store = EtaStore::open(Some(&path)).unwrap();
			store.record("avif", 200, 2.0).unwrap();
		}
		let reopened = EtaStore::open(Some(&path)).unwrap();
		assert_eq!(reopened.estimate("avif", 2.0), 200);

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn table_evicts_oldest_slot_past_capacity() {
		let store = EtaStore::in_memory();
		// Nine distinct buckets against an 8-slot table forces an eviction
		// instead of growing unboundedly.
		for i in 0..=CAPACITY {
			store.record("png", 50, i as f64).unwrap();
		}
		// The first key's slot has been reclaimed; its estimate is gone.
		assert_eq!(store.estimate("png", 0.0), 0);
		// The most recent key is still resolvable.
		assert_eq!(store.estimate("png", CAPACITY as f64), 50);
	}
}
