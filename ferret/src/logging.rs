/*!
# Ferret: Logging

The `Logger` trait is the collaborator boundary §6 names
(`info/warn/error`); [`TracingLogger`] is the concrete implementation the
service actually runs with, backed by `tracing`/`tracing-subscriber`.

Call sites with a job id in scope use the `*_with_job` variants so it
lands as a structured `job_id` field rather than being interpolated into
the message text.
*/

/// # Logger.
///
/// Side-effect-only, matching the collaborator interface: nothing in the
/// core inspects a log call's return value.
pub trait Logger: Send + Sync {
	/// # Info.
	fn info(&self, msg: &str);
	/// # Warn.
	fn warn(&self, msg: &str);
	/// # Error.
	fn error(&self, msg: &str);
	/// # Info, With a Job Id as a Structured Field.
	fn info_with_job(&self, job_id: u64, msg: &str);
	/// # Warn, With a Job Id as a Structured Field.
	fn warn_with_job(&self, job_id: u64, msg: &str);
	/// # Error, With a Job Id as a Structured Field.
	fn error_with_job(&self, job_id: u64, msg: &str);
}

#[derive(Debug, Clone, Copy, Default)]
/// # Tracing-Backed Logger.
pub struct TracingLogger;

impl Logger for TracingLogger {
	fn info(&self, msg: &str) { tracing::info!("{msg}"); }
	fn warn(&self, msg: &str) { tracing::warn!("{msg}"); }
	fn error(&self, msg: &str) { tracing::error!("{msg}"); }
	fn info_with_job(&self, job_id: u64, msg: &str) { tracing::info!(job_id = %job_id, "{msg}"); }
	fn warn_with_job(&self, job_id: u64, msg: &str) { tracing::warn!(job_id = %job_id, "{msg}"); }
	fn error_with_job(&self, job_id: u64, msg: &str) { tracing::error!(job_id = %job_id, "{msg}"); }
}

/// # Install the Global Tracing Subscriber.
///
/// Reads `RUST_LOG` (default `info`) the way every `tracing-subscriber`
/// consumer in the ecosystem does. Safe to call more than once; later
/// calls are ignored.
pub fn init() {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let _res = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.try_init();
}
