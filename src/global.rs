use std::env;

use nix::unistd;

use crate::config::Limits;
use crate::job;
use crate::search;

pub struct State {
	pub job_table: job::JobTable,
	pub limits: Limits,
	pub home: Option<String>,
	/// Set once the shell ignores SIGINT and SIGQUIT for itself.
	pub ignores_keyboard: bool,
}

impl State {
	pub fn new(limits: Limits) -> State {
		State { job_table: job::JobTable::new(), limits: limits, home: home_dir(), ignores_keyboard: false }
	}

	/// State handed to a forked stage; the job table stays with the shell.
	pub fn for_child(&self) -> State {
		State {
			job_table: job::JobTable::new(),
			limits: self.limits,
			home: self.home.clone(),
			ignores_keyboard: self.ignores_keyboard,
		}
	}

	/// The current directory with the home directory shown as `~`.
	pub fn cwd_label(&self) -> String {
		let cwd = match unistd::getcwd() {
			Ok(path) => path.to_string_lossy().into_owned(),
			Err(_) => return "?".to_string(),
		};
		match self.home {
			Some(ref home) => search::alias_home(&cwd, home),
			None => cwd,
		}
	}
}

/// Home directory of the effective user, falling back to `$HOME`.
pub fn home_dir() -> Option<String> {
	match unistd::User::from_uid(unistd::geteuid()) {
		Ok(Some(user)) => Some(user.dir.to_string_lossy().into_owned()),
		_ => env::var("HOME").ok(),
	}
}
