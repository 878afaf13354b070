/*!
# Ferret

A self-contained image-optimization HTTP service. Clients upload a PNG;
the service decodes it, produces lossless PNG, palette-quantized PNG,
WebP, and AVIF encodings in parallel, streams per-encoding progress back
over SSE, and returns everything in one JSON envelope. An "Expert" batch
endpoint accepts per-file encoding parameters and is gated behind a
pluggable auth/subscription collaborator.
*/

#![warn(missing_docs)]
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
#![warn(unused_import_braces)]

pub mod auth;
pub mod billing;
pub mod config;
pub mod encode;
pub mod error;
pub mod eta;
pub mod expert;
pub mod http;
pub mod image;
pub mod logging;
pub mod model;
pub mod progress;
pub mod queue;
pub mod usage;
pub mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use auth::{AuthStore, NullAuthStore};
use billing::{BillingStore, UnconfiguredBilling};
use config::Config;
use eta::EtaStore;
use http::result_router::ResultRouter;
use logging::{Logger, TracingLogger};
use model::{Job, JobResult};
use progress::Registry;
use queue::Queue;
use usage::UsageTable;
use worker::WorkerPool;

const PROGRESS_REGISTRY_CAPACITY: usize = 64;

/// # Application State.
///
/// One instance per process, shared (via `Arc`) across every connection
/// thread and worker thread. Holds no request-scoped data.
pub struct App {
	/// # Runtime Configuration.
	pub config: Config,
	/// # Job Queue (C1).
	pub job_queue: Arc<Queue<Job>>,
	/// # Result Queue (C1).
	pub result_queue: Arc<Queue<JobResult>>,
	/// # Out-of-Order Result Matcher (part of C6).
	pub result_router: Arc<ResultRouter>,
	/// # Progress Registry (C2).
	pub registry: Arc<Registry>,
	/// # ETA Model (part of C5).
	pub eta: Arc<EtaStore>,
	/// # Expert Daily Quota Table.
	pub usage: Arc<UsageTable>,
	/// # Auth Collaborator.
	pub auth: Arc<dyn AuthStore>,
	/// # Billing Collaborator.
	pub billing: Arc<dyn BillingStore>,
	/// # Logger.
	pub logger: Arc<dyn Logger + Send + Sync>,
	job_id_counter: AtomicU64,
}

impl App {
	#[must_use]
	/// # Bootstrap From Configuration.
	///
	/// Starts the worker pool; returns both the shared `App` and the pool
	/// handle (kept alive for the process lifetime by the caller, joined
	/// only in tests/graceful-shutdown paths).
	pub fn bootstrap(config: Config) -> (Arc<Self>, WorkerPool) {
		let job_queue = Arc::new(Queue::new(config.queue_size));
		let result_queue = Arc::new(Queue::new(config.queue_size));
		let result_router = Arc::new(ResultRouter::new(Arc::clone(&result_queue)));
		let registry = Registry::new(PROGRESS_REGISTRY_CAPACITY);
		let eta = Arc::new(EtaStore::open(config.eta_log_path().as_deref()).unwrap_or_else(|_| EtaStore::in_memory()));
		let usage = Arc::new(UsageTable::new());
		let logger: Arc<dyn Logger + Send + Sync> = Arc::new(TracingLogger);

		let pool = WorkerPool::spawn(
			config.workers,
			Arc::clone(&job_queue),
			Arc::clone(&result_queue),
			Arc::clone(&eta),
			Arc::clone(&logger),
		);

		let app = Arc::new(Self {
			config,
			job_queue,
			result_queue,
			result_router,
			registry,
			eta,
			usage,
			auth: Arc::new(NullAuthStore),
			billing: Arc::new(UnconfiguredBilling),
			logger,
			job_id_counter: AtomicU64::new(1),
		});

		(app, pool)
	}

	/// # Assign a Job Id.
	///
	/// Uses the client-supplied id if nonzero; otherwise draws the next
	/// value from the global counter. `0` is reserved and never handed
	/// out, matching the "id 0 means not supplied" convention (§8).
	pub fn assign_job_id(&self, client_supplied: Option<u64>) -> u64 {
		match client_supplied {
			Some(id) if id != 0 => id,
			_ => loop {
				let id = self.job_id_counter.fetch_add(1, Ordering::Relaxed);
				if id != 0 { return id; }
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn assign_job_id_prefers_client_supplied_nonzero() {
		let (app, pool) = App::bootstrap(Config { workers: 1, ..Config::default() });
		assert_eq!(app.assign_job_id(Some(42)), 42);
		assert_ne!(app.assign_job_id(Some(0)), 0);
		drop(pool);
	}
}
