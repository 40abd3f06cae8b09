use std::env;
use std::path::PathBuf;

use argh::FromArgs;

pub const LOG_ENV: &str = "LISH_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";

pub const MAX_STAGES: usize = 100;
pub const MAX_ARGS: usize = 100;
pub const MAX_PATH: usize = 1024;

/// Upper bounds enforced while parsing a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
	pub max_stages: usize,
	pub max_args: usize,
	pub max_path: usize,
}

impl Default for Limits {
	fn default() -> Limits {
		Limits { max_stages: MAX_STAGES, max_args: MAX_ARGS, max_path: MAX_PATH }
	}
}

/// A line-oriented command interpreter.
#[derive(FromArgs, Debug)]
pub struct Args {
	/// script to run instead of reading commands from standard input
	#[argh(positional)]
	pub script: Option<PathBuf>,

	/// maximum number of stages in one pipeline
	#[argh(option)]
	pub max_stages: Option<usize>,

	/// maximum number of arguments in one stage
	#[argh(option)]
	pub max_args: Option<usize>,

	/// maximum length of a path or argument in bytes
	#[argh(option)]
	pub max_path: Option<usize>,

	/// log filter directive, e.g. `debug` or `lish::eval=trace`
	#[argh(option)]
	pub log: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub script: Option<PathBuf>,
	pub limits: Limits,
	pub log_filter: String,
}

impl Config {
	pub fn from_args(args: Args) -> Config {
		let defaults = Limits::default();
		let limits = Limits {
			max_stages: args.max_stages.unwrap_or(defaults.max_stages),
			max_args: args.max_args.unwrap_or(defaults.max_args),
			max_path: args.max_path.unwrap_or(defaults.max_path),
		};
		let log_filter = args.log
			.or_else(|| env::var(LOG_ENV).ok())
			.unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
		Config { script: args.script, limits: limits, log_filter: log_filter }
	}
}
