/*!
# `ferretd`

Thin entry point: load configuration from the environment, initialize
logging, bootstrap the application (spawning the worker pool), and serve
HTTP connections until the process is killed.
*/

use ferret::config::Config;
use ferret::http::serve_forever;
use ferret::logging;
use ferret::App;

fn main() {
	logging::init();

	let config = Config::from_env();
	let (app, _workers) = App::bootstrap(config);

	if let Err(e) = serve_forever(app) {
		eprintln!("ferretd: fatal: {e}");
		std::process::exit(1);
	}
}
