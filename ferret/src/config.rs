/*!
# Ferret: Config

Reads the handful of `FERRET_*` / `FP_EXPERT_*` environment variables §6
names. This is a daemon, not a CLI tool, so there is no flag parser here —
just env lookups with sane fallbacks. A misconfigured value (non-numeric
port, say) falls back to the default rather than aborting startup.
*/

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
/// # Runtime Configuration.
pub struct Config {
	/// # Listen Host.
	pub host: String,
	/// # Listen Port.
	pub port: u16,
	/// # Worker Thread Count.
	pub workers: usize,
	/// # Job/Result Queue Capacity.
	pub queue_size: usize,
	/// # Expert-Mode Env API Keys.
	///
	/// If non-empty, `Authorization: ApiKey <token>` matching one of these
	/// allows Expert requests without consulting the auth collaborator.
	pub expert_api_keys: HashSet<String>,
	/// # Directory for Persisted State (the ETA sample log).
	///
	/// `None` runs the ETA model purely in-memory.
	pub data_dir: Option<PathBuf>,
	/// # Public Static-File Root.
	pub public_dir: PathBuf,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			host: "0.0.0.0".to_owned(),
			port: 4317,
			workers: 4,
			queue_size: 128,
			expert_api_keys: HashSet::new(),
			data_dir: None,
			public_dir: PathBuf::from("public"),
		}
	}
}

impl Config {
	#[must_use]
	/// # Load From the Environment.
	pub fn from_env() -> Self {
		let mut cfg = Self::default();

		if let Ok(v) = env::var("FERRET_HOST") {
			if !v.is_empty() { cfg.host = v; }
		}
		if let Some(v) = env_parsed::<u16>("FERRET_PORT") { cfg.port = v; }
		if let Some(v) = env_parsed::<usize>("FERRET_WORKERS") {
			if v > 0 { cfg.workers = v; }
		}
		if let Some(v) = env_parsed::<usize>("FERRET_QUEUE_SIZE") { cfg.queue_size = v; }

		// Clamp queue size to at least twice the worker count so the
		// worker pool can never fully starve the in-flight job/result
		// pipeline.
		cfg.queue_size = cfg.queue_size.max(cfg.workers.saturating_mul(2)).max(2);

		cfg.expert_api_keys = expert_keys_from_env();

		if let Ok(v) = env::var("FERRET_DATA_DIR") {
			if !v.is_empty() { cfg.data_dir = Some(PathBuf::from(v)); }
		}
		if let Ok(v) = env::var("FERRET_PUBLIC_DIR") {
			if !v.is_empty() { cfg.public_dir = PathBuf::from(v); }
		}

		cfg
	}

	#[must_use]
	/// # ETA Sample Log Path.
	pub fn eta_log_path(&self) -> Option<PathBuf> {
		self.data_dir.as_ref().map(|dir| dir.join("eta.log"))
	}
}

/// # Parse an Env Var, Silently Discarding Garbage.
fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
	env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// # Merge `FP_EXPERT_API_KEYS` and `FP_EXPERT_API_KEY` (both CSV) Into One Set.
fn expert_keys_from_env() -> HashSet<String> {
	let mut out = HashSet::new();
	for name in ["FP_EXPERT_API_KEYS", "FP_EXPERT_API_KEY"] {
		if let Ok(csv) = env::var(name) {
			for tok in csv.split(',') {
				let tok = tok.trim();
				if !tok.is_empty() { out.insert(tok.to_owned()); }
			}
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn queue_size_clamps_to_workers() {
		let mut cfg = Config { workers: 10, queue_size: 4, ..Config::default() };
		cfg.queue_size = cfg.queue_size.max(cfg.workers.saturating_mul(2)).max(2);
		assert_eq!(cfg.queue_size, 20);
	}

	#[test]
	fn default_is_sane() {
		let cfg = Config::default();
		assert_eq!(cfg.port, 4317);
		assert_eq!(cfg.workers, 4);
		assert!(cfg.expert_api_keys.is_empty());
	}
}
