/*!
# Ferret: Connection Accept Loop (part of C6)

One OS thread per accepted connection; if thread creation fails the
connection is handled inline on the accept loop itself rather than
dropped (§4.5's concurrency model spells this out explicitly).
*/

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crate::logging::Logger;
use crate::App;

use super::request::read_request;
use super::response::write_error;
use super::router;

/// # Bind and Serve Forever.
///
/// Never returns under normal operation; `accept` errors are logged and
/// skipped, except where the listening socket itself is broken.
pub fn serve_forever(app: Arc<App>) -> std::io::Result<()> {
	let addr = format!("{}:{}", app.config.host, app.config.port);
	let listener = TcpListener::bind(&addr)?;
	app.logger.info(&format!("listening on {addr}"));

	for incoming in listener.incoming() {
		match incoming {
			Ok(stream) => accept_one(&app, stream),
			Err(e) => app.logger.warn(&format!("accept failed: {e}")),
		}
	}

	Ok(())
}

fn accept_one(app: &Arc<App>, stream: TcpStream) {
	let for_thread = stream.try_clone();
	match for_thread {
		Ok(cloned) => {
			let app = Arc::clone(app);
			let spawned = thread::Builder::new()
				.name("ferret-conn".to_string())
				.spawn(move || handle_connection(&app, cloned));

			// `spawn` consumes the closure (and with it `cloned`) even on
			// failure, so the original `stream` — still owned here — is
			// what the inline fallback below uses.
			if let Err(e) = spawned {
				app.logger.warn(&format!("thread spawn failed, handling inline: {e}"));
				handle_connection(app.as_ref(), stream);
			}
		}
		Err(e) => {
			app.logger.warn(&format!("socket clone failed, handling inline: {e}"));
			handle_connection(app, stream);
		}
	}
}

fn handle_connection(app: &App, mut stream: TcpStream) {
	let request = match read_request(&mut stream) {
		Ok(req) => req,
		Err(err) => { let _ = write_error(&mut stream, &err); return; }
	};

	if let Err(e) = router::dispatch(app, &request, &mut stream) {
		app.logger.warn(&format!("response write failed: {e}"));
	}
}
