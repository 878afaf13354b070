/*!
# Ferret: Out-of-Order Result Matching (part of C6)

The result queue is shared across every in-flight request; a dispatcher
waiting on job N may pop job M's result first. Non-matching results go
into a bounded 16-slot side-cache, checked before every pop. When the
cache is full, the oldest unclaimed result is evicted.

An evicted result is simply gone — its HTTP request is left waiting until
the progress channel times out, and no SSE status event is emitted for
it. That behavior is kept rather than redesigned: 16 concurrent in-flight
*misrouted* results is already a sign something upstream is badly
overloaded, so the only change here is that eviction is logged instead of
silent, giving an operator a chance to notice.
*/

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::logging::Logger;
use crate::model::JobResult;
use crate::queue::{PopError, Queue};

const CACHE_CAPACITY: usize = 16;
const POLL_BACKOFF: Duration = Duration::from_millis(2);

/// # Result Router.
pub struct ResultRouter {
	queue: Arc<Queue<JobResult>>,
	cache: Mutex<VecDeque<JobResult>>,
}

impl ResultRouter {
	#[must_use]
	/// # New, Wrapping a Shared Result Queue.
	pub fn new(queue: Arc<Queue<JobResult>>) -> Self {
		Self { queue, cache: Mutex::new(VecDeque::with_capacity(CACHE_CAPACITY)) }
	}

	/// # Block Until the Result for `job_id` Is Available.
	pub fn wait_for(&self, job_id: u64, logger: &dyn Logger) -> JobResult {
		loop {
			if let Some(result) = self.take_cached(job_id) {
				return result;
			}

			match self.queue.pop() {
				Ok(result) if result.id == job_id => return result,
				Ok(result) => self.cache(result, logger),
				Err(PopError::Empty) => thread::sleep(POLL_BACKOFF),
			}
		}
	}

	fn take_cached(&self, job_id: u64) -> Option<JobResult> {
		let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
		let idx = cache.iter().position(|r| r.id == job_id)?;
		cache.remove(idx)
	}

	fn cache(&self, result: JobResult, logger: &dyn Logger) {
		let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
		if cache.len() >= CACHE_CAPACITY {
			if let Some(evicted) = cache.pop_front() {
				logger.warn_with_job(evicted.id, "result side-cache full; dropping unclaimed result");
			}
		}
		cache.push_back(result);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::logging::TracingLogger;
	use std::time::Instant;

	fn dummy_result(id: u64) -> JobResult {
		let now = Instant::now();
		JobResult {
			id, input_size: 0, images: Vec::new(), status: 0, message: "ok".to_string(),
			start: now, end: now, input_dims: (0, 0), output_dims: (0, 0),
			trim_applied: false, crop_applied: false,
		}
	}

	#[test]
	fn matches_the_first_result_directly() {
		let queue = Arc::new(Queue::new(4));
		queue.push(dummy_result(7)).unwrap();
		let router = ResultRouter::new(queue);
		let got = router.wait_for(7, &TracingLogger);
		assert_eq!(got.id, 7);
	}

	#[test]
	fn out_of_order_result_is_cached_then_matched() {
		let queue = Arc::new(Queue::new(4));
		queue.push(dummy_result(1)).unwrap();
		queue.push(dummy_result(2)).unwrap();
		let router = ResultRouter::new(queue);

		let first = router.wait_for(2, &TracingLogger);
		assert_eq!(first.id, 2);
		let second = router.wait_for(1, &TracingLogger);
		assert_eq!(second.id, 1);
	}

	#[test]
	fn cache_evicts_oldest_past_capacity() {
		let queue = Arc::new(Queue::new(1));
		let router = ResultRouter::new(queue);

		for id in 0..20 {
			router.cache(dummy_result(id), &TracingLogger);
		}

		let cache = router.cache.lock().unwrap();
		assert_eq!(cache.len(), CACHE_CAPACITY);
		// The oldest entries (0..4) should have been evicted first.
		assert!(cache.iter().all(|r| r.id >= 4));
	}
}
