/*!
# Ferret: Routing (part of C6)

Maps a parsed [`Request`] to one of the handful of endpoints in §6,
dispatching to the worker pool for the two compress routes and to the
auth/billing collaborators for everything else.
*/

use std::io::{self, Write};
use std::time::Instant;

use base64::Engine;
use serde_json::{json, Value};

use crate::App;
use crate::error::HttpError;
use crate::expert::{self, GateOutcome};
use crate::model::{Format, Job, JobMode};
use crate::usage::QuotaOutcome;

use super::request::Request;
use super::response::{write_error, write_json, write_response};
use super::{sse, static_files};

const PUSH_RETRY_ATTEMPTS: u32 = 50;
const PUSH_RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(2);

/// # Dispatch One Request.
pub fn dispatch<W: Write>(app: &App, req: &Request, w: &mut W) -> io::Result<()> {
	let result = route(app, req, w);
	if let Err(err) = result {
		return write_error(w, &err);
	}
	Ok(())
}

fn route<W: Write>(app: &App, req: &Request, w: &mut W) -> Result<(), HttpError> {
	match (req.method.as_str(), req.path.as_str()) {
		("GET", path) if path.starts_with("/api/jobs/") && path.ends_with("/events") => {
			let id = parse_job_events_id(path)?;
			sse::serve(w, &app.registry, id, app.logger.as_ref()).map_err(|_| HttpError::Internal("sse stream failed"))
		}
		("POST", "/api/compress") => handle_simple_compress(app, req, w),
		("POST", "/api/expert/compress") => handle_expert_compress(app, req, w),
		("POST", "/auth/google" | "/auth/facebook" | "/api/keys") => Err(HttpError::NotImplemented),
		("POST", "/api/stripe/checkout") => handle_billing(app, req, w, BillingRoute::Checkout),
		("POST", "/api/stripe/portal") => handle_billing(app, req, w, BillingRoute::Portal),
		("POST", "/webhook/stripe") => handle_billing(app, req, w, BillingRoute::Webhook),
		("GET", path) => {
			let (bytes, mime) = static_files::serve(&app.config.public_dir, path)?;
			write_response(w, 200, mime, &bytes).map_err(io_to_http)
		}
		_ => Err(HttpError::NotFound),
	}
}

fn io_to_http(_: io::Error) -> HttpError { HttpError::Internal("client disconnected") }

fn parse_job_events_id(path: &str) -> Result<u64, HttpError> {
	path.strip_prefix("/api/jobs/")
		.and_then(|rest| rest.strip_suffix("/events"))
		.and_then(|id| id.parse::<u64>().ok())
		.ok_or(HttpError::BadRequest("bad job id"))
}

fn handle_simple_compress<W: Write>(app: &App, req: &Request, w: &mut W) -> Result<(), HttpError> {
	if req.body.is_empty() {
		return Err(HttpError::BadRequest("Missing body"));
	}

	let tune_format = match req.header("x-tune-format") {
		Some(v) => Some(Format::parse(v).ok_or(HttpError::BadRequest("unknown tune target"))?),
		None => None,
	};
	let tune_label = req.header("x-tune-label").map(str::to_string);
	let tune_direction = match req.header("x-tune-intent") {
		Some("more") => 1,
		Some("less") => -1,
		_ => 0,
	};

	let client_job_id = req.header("x-job-id").and_then(|v| v.parse::<u64>().ok());
	let id = app.assign_job_id(client_job_id);
	let filename = req.header("x-filename")
		.map(|f| expert::sanitize_filename(f))
		.unwrap_or_else(|| "upload.png".to_string());

	let progress = app.registry.register(id);
	let job = Job {
		id,
		bytes: req.body.clone(),
		filename,
		enqueue_time: Instant::now(),
		progress: Some(progress.clone()),
		mode: JobMode::Simple { tune_format, tune_label, tune_direction },
	};

	submit_job(app, job, Some(&progress))?;

	let result = app.result_router.wait_for(id, app.logger.as_ref());
	write_json(w, 200, &result_envelope(&result)).map_err(io_to_http)
}

fn submit_job(app: &App, mut job: Job, progress: Option<&crate::progress::ProgressHandle>) -> Result<(), HttpError> {
	for _ in 0..PUSH_RETRY_ATTEMPTS {
		match app.job_queue.push(job) {
			Ok(()) => return Ok(()),
			Err(crate::queue::PushError::Full(back)) => {
				job = back;
				std::thread::sleep(PUSH_RETRY_BACKOFF);
			}
		}
	}

	if let Some(handle) = progress {
		handle.emit(crate::progress::ProgressEvent::new(
			crate::progress::EventKind::Status,
			json!({ "status": "error", "message": "server_busy" }),
		));
		handle.close();
	}
	Err(HttpError::ServerBusy)
}

fn result_envelope(result: &crate::model::JobResult) -> Value {
	let results: Vec<Value> = result.images.iter().map(|img| json!({
		"format": img.format.as_str(),
		"label": img.label,
		"bytes": img.bytes.len(),
		"mime": img.mime(),
		"extension": img.extension(),
		"tuning": img.tuning.as_str(),
		"data": base64::engine::general_purpose::STANDARD.encode(&img.bytes),
	})).collect();

	json!({
		"status": if result.is_ok() { "ok" } else { "error" },
		"jobId": result.id,
		"message": result.message,
		"inputBytes": result.input_size,
		"durationMs": result.duration_ms(),
		"results": results,
	})
}

fn handle_expert_compress<W: Write>(app: &App, req: &Request, w: &mut W) -> Result<(), HttpError> {
	let content_type = req.header("content-type").ok_or(HttpError::BadRequest("missing Content-Type"))?;
	let files = expert::parse_expert_request(content_type, &req.body)?;

	let (api_key, bearer) = parse_authorization(req.header("authorization"));
	let cookie = req.cookies.get("fp_access").map(String::as_str);

	let gate = expert::gate(&app.config.expert_api_keys, app.auth.as_ref(), api_key.as_deref(), bearer.as_deref(), cookie);
	let user_id = match gate {
		GateOutcome::Denied => return Err(HttpError::Unauthorized),
		GateOutcome::Allowed { user_id, .. } => user_id.unwrap_or_else(|| "anonymous".to_string()),
	};

	let total_bytes: u64 = files.iter().map(|f| f.bytes.len() as u64).sum();
	if expert::check_quota(&app.usage, &user_id, files.len() as u32, total_bytes) == QuotaOutcome::Exceeded {
		return Err(HttpError::TooManyRequests);
	}

	let start = Instant::now();
	let mut job_ids = Vec::with_capacity(files.len());

	for file in &files {
		let id = app.assign_job_id(None);
		let job = Job {
			id,
			bytes: file.bytes.clone(),
			filename: file.filename.clone(),
			enqueue_time: Instant::now(),
			progress: None,
			mode: file.metadata.to_job_mode(),
		};
		submit_job(app, job, None)?;
		job_ids.push(id);
	}

	let mut per_file = Vec::with_capacity(job_ids.len());
	let mut total_input = 0u64;
	let mut total_output = 0u64;

	for (id, file) in job_ids.into_iter().zip(files.iter()) {
		let result = app.result_router.wait_for(id, app.logger.as_ref());
		total_input += result.input_size;
		total_output += result.images.iter().map(|i| i.bytes.len() as u64).sum::<u64>();
		per_file.push(json!({
			"filename": file.filename,
			"jobId": result.id,
			"status": if result.is_ok() { "ok" } else { "error" },
			"message": result.message,
			"trimApplied": result.trim_applied,
			"cropApplied": result.crop_applied,
			"results": result.images.iter().map(|img| json!({
				"format": img.format.as_str(),
				"label": img.label,
				"bytes": img.bytes.len(),
				"mime": img.mime(),
				"extension": img.extension(),
				"data": base64::engine::general_purpose::STANDARD.encode(&img.bytes),
			})).collect::<Vec<_>>(),
		}));
	}

	let envelope = json!({
		"status": "ok",
		"results": per_file,
		"bytesSaved": total_input.saturating_sub(total_output),
		"totalInputBytes": total_input,
		"totalOutputBytes": total_output,
		"elapsedMs": start.elapsed().as_millis() as u64,
	});

	write_json(w, 200, &envelope).map_err(io_to_http)
}

fn parse_authorization(header: Option<&str>) -> (Option<String>, Option<String>) {
	let Some(value) = header else { return (None, None); };
	if let Some(key) = value.strip_prefix("ApiKey ") {
		return (Some(key.trim().to_string()), None);
	}
	if let Some(token) = value.strip_prefix("Bearer ") {
		return (None, Some(token.trim().to_string()));
	}
	(None, None)
}

enum BillingRoute { Checkout, Portal, Webhook }

fn handle_billing<W: Write>(app: &App, req: &Request, w: &mut W, route: BillingRoute) -> Result<(), HttpError> {
	let (_, bearer) = parse_authorization(req.header("authorization"));
	let user_id = bearer
		.and_then(|t| app.auth.validate_access(&t))
		.map(|u| u.id)
		.unwrap_or_else(|| "anonymous".to_string());

	let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);

	let value = match route {
		BillingRoute::Checkout => app.billing.create_checkout_session(&user_id, &body)?,
		BillingRoute::Portal => app.billing.create_portal_session(&user_id)?,
		BillingRoute::Webhook => {
			// Stripe's signature header isn't in the fixed recognized set
			// (§4.6); `UnconfiguredBilling` rejects this route regardless.
			app.billing.handle_webhook(&req.body, None)?;
			json!({ "status": "ok" })
		}
	};

	write_json(w, 200, &value).map_err(io_to_http)
}
