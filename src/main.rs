use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use lish::config::{self, Args, Config};
use lish::eval;
use lish::global::State;
use lish::prompt::Prompt;
use lish::repl;

fn init_logging(filter: &str) {
	let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.without_time()
		.init();
}

fn run() -> Result<i32> {
	let args: Args = argh::from_env();
	let config = Config::from_args(args);
	init_logging(&config.log_filter);

	let mut state = State::new(config.limits);
	let status = match config.script {
		Some(ref path) => {
			let file = File::open(path).map_err(|_| anyhow!("{}: No such file or directory", path.display()))?;
			repl::run(&mut state, BufReader::new(file), None)
		},
		None => {
			let prompt = Prompt::new()?;
			eval::ignore_keyboard_signals()?;
			state.ignores_keyboard = true;
			let stdin = io::stdin();
			repl::run(&mut state, stdin.lock(), Some(&prompt))
		},
	};
	Ok(status)
}

fn main() {
	let status = run().unwrap_or_else(|e| {
		let _ = writeln!(io::stderr(), "lish: {}", e);
		1
	});
	let _ = io::stdout().flush();
	process::exit(status)
}
