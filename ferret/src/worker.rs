/*!
# Ferret: Worker Pool (C5)

N worker threads, each pulling one [`Job`] at a time off the job queue,
decoding once, and fanning encoding out across one thread per task. The
first task to fail (in task order) becomes the job's failure; a panic
inside a task thread is caught so one bad encoder can never take down the
worker or leave a job unanswered.
*/

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use base64::Engine;
use serde_json::json;

use crate::encode::{encode_avif, encode_png, encode_png_best_of, encode_pngquant, encode_webp};
use crate::error::EncodeError;
use crate::eta::EtaStore;
use crate::image::{crop, decode_png, trim, RgbaImage};
use crate::logging::Logger;
use crate::model::{EncodedImage, Format, Job, JobMode, JobResult, RequestedOutput, Tuning};
use crate::progress::{EventKind, ProgressEvent, ProgressHandle};
use crate::queue::{PopError, PushError, Queue};

const POP_BACKOFF: Duration = Duration::from_millis(2);
const PUSH_BACKOFF: Duration = Duration::from_millis(2);

/// One encode attempt, bound to the lifetime of the decoded image it
/// closes over.
struct Task<'img> {
	format: Format,
	label: String,
	tuning: Tuning,
	run: Box<dyn FnOnce() -> Result<Vec<u8>, EncodeError> + Send + 'img>,
}

/// # Worker Pool.
///
/// Owns no job state itself; every worker thread shares the same job/
/// result queues and ETA store.
pub struct WorkerPool {
	handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	/// # Spawn.
	///
	/// Starts `workers` threads, each looping until `job_queue` and
	/// `result_queue` are dropped (an `Arc` held by the caller keeps them
	/// alive for the process lifetime in practice).
	#[must_use]
	pub fn spawn(
		workers: usize,
		job_queue: Arc<Queue<Job>>,
		result_queue: Arc<Queue<JobResult>>,
		eta: Arc<EtaStore>,
		logger: Arc<dyn Logger + Send + Sync>,
	) -> Self {
		let workers = workers.max(1);
		let mut handles = Vec::with_capacity(workers);

		for idx in 0..workers {
			let job_queue = Arc::clone(&job_queue);
			let result_queue = Arc::clone(&result_queue);
			let eta = Arc::clone(&eta);
			let logger = Arc::clone(&logger);

			handles.push(thread::Builder::new()
				.name(format!("ferret-worker-{idx}"))
				.spawn(move || worker_loop(&job_queue, &result_queue, &eta, logger.as_ref()))
				.expect("failed to spawn worker thread"));
		}

		Self { handles }
	}

	/// # Join All Workers.
	///
	/// Only returns once every worker thread has exited (i.e. its queue
	/// was torn down); used by graceful-shutdown paths and tests.
	pub fn join(self) {
		for h in self.handles { let _ = h.join(); }
	}
}

fn worker_loop(job_queue: &Queue<Job>, result_queue: &Queue<JobResult>, eta: &EtaStore, logger: &dyn Logger) {
	loop {
		let job = match job_queue.pop() {
			Ok(job) => job,
			Err(PopError::Empty) => { thread::sleep(POP_BACKOFF); continue; }
		};

		let mut result = run_job(job, eta, logger);
		loop {
			match result_queue.push(result) {
				Ok(()) => break,
				Err(PushError::Full(back)) => { result = back; thread::sleep(PUSH_BACKOFF); }
			}
		}
	}
}

fn run_job(job: Job, eta: &EtaStore, logger: &dyn Logger) -> JobResult {
	let start = Instant::now();
	let id = job.id;
	let input_size = job.bytes.len() as u64;
	let progress = job.progress;

	let decoded = match decode_png(&job.bytes) {
		Ok(img) => img,
		Err(e) => {
			logger.warn_with_job(id, &format!("decode failed: {e}"));
			return finish_failed(id, input_size, start, e.code().to_string(), progress);
		}
	};
	let input_dims = (decoded.width, decoded.height);

	let (img, trim_applied, crop_applied) = match &job.mode {
		JobMode::Simple { .. } => (decoded, false, false),
		JobMode::Expert { trim: trim_spec, crop: crop_spec, .. } => apply_expert_geometry(
			decoded, trim_spec.enabled, trim_spec.tolerance,
			crop_spec.enabled, crop_spec.x, crop_spec.y, crop_spec.w, crop_spec.h,
		),
	};
	let output_dims = (img.width, img.height);
	let work_units = img.work_units();

	let mut images = Vec::new();
	let mut first_failure: Option<EncodeError> = None;

	thread::scope(|scope| {
		let tasks = build_tasks(&job.mode, &img);
		let handles: Vec<_> = tasks.into_iter().map(|task| {
			scope.spawn(move || {
				let task_start = Instant::now();
				let outcome = catch_unwind(AssertUnwindSafe(task.run));
				let elapsed_ms = task_start.elapsed().as_millis() as u64;
				match outcome {
					Ok(Ok(bytes)) => Ok((task.format, task.label, task.tuning, bytes, elapsed_ms)),
					Ok(Err(e)) => Err(e),
					Err(_) => Err(encoder_panic_error(task.format)),
				}
			})
		}).collect();

		for h in handles {
			match h.join() {
				Ok(Ok((format, label, tuning, bytes, elapsed_ms))) => {
					let _ = eta.record(format.as_str(), elapsed_ms, work_units);
					let eta_ms = eta.estimate(format.as_str(), work_units);

					if let Some(handle) = &progress {
						emit_output(handle, id, format, &label, &bytes, input_size, elapsed_ms, eta_ms);
					}

					images.push(EncodedImage { format, label, tuning, bytes, elapsed_ms });
				}
				Ok(Err(e)) => { first_failure.get_or_insert(e); }
				Err(_) => { first_failure.get_or_insert(EncodeError::Png); }
			}
		}
	});

	let end = Instant::now();
	let (status, message) = match first_failure {
		None => (0, "ok".to_string()),
		Some(e) => (-1, e.code().to_string()),
	};

	if let Some(handle) = &progress {
		handle.emit(ProgressEvent::new(EventKind::Status, json!({
			"job_id": id,
			"status": if status == 0 { "ok" } else { "error" },
			"message": message,
		})));
		handle.close();
	}

	JobResult {
		id, input_size, images, status, message, start, end,
		input_dims, output_dims, trim_applied, crop_applied,
	}
}

fn emit_output(handle: &ProgressHandle, id: u64, format: Format, label: &str, bytes: &[u8], input_size: u64, elapsed_ms: u64, eta_ms: u64) {
	handle.emit(ProgressEvent::new(EventKind::Output, json!({
		"job_id": id,
		"format": format.as_str(),
		"label": label,
		"byte_size": bytes.len(),
		"mime": format.mime(),
		"extension": format.extension(),
		"payload": base64::engine::general_purpose::STANDARD.encode(bytes),
		"input_size": input_size,
		"elapsed_ms": elapsed_ms,
		"eta_ms": eta_ms,
	})));
}

fn finish_failed(id: u64, input_size: u64, start: Instant, message: String, progress: Option<ProgressHandle>) -> JobResult {
	let end = Instant::now();
	if let Some(handle) = &progress {
		handle.emit(ProgressEvent::new(EventKind::Status, json!({
			"job_id": id,
			"status": "error",
			"message": message,
		})));
		handle.close();
	}
	JobResult {
		id, input_size, images: Vec::new(), status: -1, message,
		start, end, input_dims: (0, 0), output_dims: (0, 0), trim_applied: false, crop_applied: false,
	}
}

fn apply_expert_geometry(
	img: RgbaImage, trim_enabled: bool, trim_tolerance: f32,
	crop_enabled: bool, x: i64, y: i64, w: i64, h: i64,
) -> (RgbaImage, bool, bool) {
	let (img, trim_applied) = if trim_enabled { trim(&img, trim_tolerance) } else { (img, false) };

	if crop_enabled && w > 0 && h > 0 {
		match crop(&img, x, y, w, h) {
			Ok(cropped) => (cropped, trim_applied, true),
			Err(_) => (img, trim_applied, false),
		}
	} else {
		(img, trim_applied, false)
	}
}

fn encoder_panic_error(format: Format) -> EncodeError {
	match format {
		Format::Png => EncodeError::Png,
		Format::PngQuant => EncodeError::PngQuant,
		Format::Webp => EncodeError::Webp,
		Format::Avif => EncodeError::Avif,
	}
}

fn build_tasks<'img>(mode: &JobMode, img: &'img RgbaImage) -> Vec<Task<'img>> {
	match mode {
		JobMode::Simple { tune_format, tune_label, tune_direction } => {
			simple_tasks(img, *tune_format, tune_label.as_deref(), *tune_direction)
		}
		JobMode::Expert { outputs, .. } => expert_tasks(img, outputs),
	}
}

fn simple_tasks<'img>(img: &'img RgbaImage, tune_format: Option<Format>, tune_label: Option<&str>, direction: i8) -> Vec<Task<'img>> {
	let tuning = Tuning::from_direction(direction);

	let png = Task {
		format: Format::Png,
		label: "lossless".to_string(),
		tuning,
		run: Box::new(move || match direction {
			d if d > 0 => encode_png_best_of(img, &[9, 7, 6]).map(|(bytes, _)| bytes),
			d if d < 0 => encode_png(img, 1),
			_ => encode_png(img, 5),
		}),
	};

	let pngquant_colors: u16 = match direction { d if d > 0 => 96, d if d < 0 => 192, _ => 128 };
	let pngquant = Task {
		format: Format::PngQuant,
		label: format!("pngquant q{}", pngquant_label_quality(pngquant_colors)),
		tuning,
		run: Box::new(move || encode_pngquant(img, pngquant_colors)),
	};

	let webp_quality: u8 = match direction { d if d > 0 => 60, d if d < 0 => 96, _ => 90 };
	let webp = Task {
		format: Format::Webp,
		label: "high".to_string(),
		tuning,
		run: Box::new(move || encode_webp(img, webp_quality)),
	};

	let avif_quantizer: u8 = match direction { d if d > 0 => 36, d if d < 0 => 20, _ => 28 };
	let avif = Task {
		format: Format::Avif,
		label: "medium".to_string(),
		tuning,
		run: Box::new(move || encode_avif(img, avif_quantizer)),
	};

	let all = vec![png, pngquant, webp, avif];

	match tune_format {
		None => all,
		Some(fmt) => all.into_iter()
			.filter(|t| t.format == fmt)
			.filter(|t| tune_label.map_or(true, |l| l == t.label))
			.collect(),
	}
}

/// # Cosmetic "qNN" Label for the Quantized-Colors Baseline.
///
/// The default label is `pngquant q80`; tuned variants keep the same
/// `q<NN>` shape scaled off the color count so the label still
/// communicates roughly how aggressive the quantization is.
fn pngquant_label_quality(colors: u16) -> u16 { (colors as u32 * 80 / 128) as u16 }

fn expert_tasks<'img>(img: &'img RgbaImage, outputs: &[RequestedOutput]) -> Vec<Task<'img>> {
	outputs.iter().map(|out| {
		let format = out.format;
		let label = out.label.clone().unwrap_or_else(|| format.default_label().to_string());
		let png_level = out.png_level;
		let pngquant_colors = out.pngquant_colors;
		let webp_quality = out.webp_quality;
		let avif_quality = out.avif_quality;

		let run: Box<dyn FnOnce() -> Result<Vec<u8>, EncodeError> + Send + 'img> = match format {
			Format::Png => Box::new(move || encode_png(img, png_level)),
			Format::PngQuant => Box::new(move || encode_pngquant(img, pngquant_colors)),
			Format::Webp => Box::new(move || encode_webp(img, webp_quality)),
			Format::Avif => Box::new(move || encode_avif(img, avif_quality)),
		};

		Task { format, label, tuning: Tuning::None, run }
	}).collect()
}
