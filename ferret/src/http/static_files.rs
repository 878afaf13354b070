/*!
# Ferret: Static File Serving (A5)

Serves files under a fixed public root. Any request path containing a
`..` segment or a NUL byte is rejected outright rather than resolved and
bounds-checked — simpler to audit, and the service has no legitimate
reason to ever serve anything outside the root.
*/

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HttpError;

/// # Resolve a Request Path to a File Under `root`, Reading It.
///
/// `request_path` is the raw path from the request line (e.g. `/foo/bar.css`).
/// `/` resolves to `index.html`.
pub fn serve(root: &Path, request_path: &str) -> Result<(Vec<u8>, &'static str), HttpError> {
	if request_path.contains("..") || request_path.contains('\0') {
		return Err(HttpError::NotFound);
	}

	let relative = if request_path == "/" { "index.html" } else { request_path.trim_start_matches('/') };
	if relative.is_empty() {
		return Err(HttpError::NotFound);
	}

	let full: PathBuf = root.join(relative);
	let bytes = fs::read(&full).map_err(|_| HttpError::NotFound)?;
	Ok((bytes, mime_for(&full)))
}

fn mime_for(path: &Path) -> &'static str {
	match path.extension().and_then(|e| e.to_str()) {
		Some("html") => "text/html; charset=utf-8",
		Some("css") => "text/css",
		Some("js") => "application/javascript",
		Some("json") => "application/json",
		Some("png") => "image/png",
		Some("svg") => "image/svg+xml",
		Some("ico") => "image/x-icon",
		_ => "application/octet-stream",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn scratch_root() -> PathBuf {
		let dir = std::env::temp_dir().join(format!("ferret_static_test_{}", std::process::id()));
		fs::create_dir_all(&dir).unwrap();
		let mut f = fs::File::create(dir.join("index.html")).unwrap();
		f.write_all(b"<html></html>").unwrap();
		dir
	}

	#[test]
	fn root_path_serves_index() {
		let root = scratch_root();
		let (bytes, mime) = serve(&root, "/").unwrap();
		assert_eq!(bytes, b"<html></html>");
		assert_eq!(mime, "text/html; charset=utf-8");
		let _ = fs::remove_dir_all(&root);
	}

	#[test]
	fn dotdot_is_rejected() {
		let root = scratch_root();
		let err = serve(&root, "/../index.html").unwrap_err();
		assert_eq!(err.status(), 404);
		let _ = fs::remove_dir_all(&root);
	}

	#[test]
	fn missing_file_is_404() {
		let root = scratch_root();
		let err = serve(&root, "/nope.css").unwrap_err();
		assert_eq!(err.status(), 404);
		let _ = fs::remove_dir_all(&root);
	}

	#[test]
	fn nul_byte_is_rejected() {
		let root = scratch_root();
		let err = serve(&root, "/index.html\0.css").unwrap_err();
		assert_eq!(err.status(), 404);
		let _ = fs::remove_dir_all(&root);
	}

	#[test]
	fn ico_resolves_to_icon_mime() {
		assert_eq!(mime_for(Path::new("favicon.ico")), "image/x-icon");
	}
}
