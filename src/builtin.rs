use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::str::FromStr;

use nix::sys::signal::{self, Signal};
use nix::unistd;

use crate::global;
use crate::job;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Builtin { Cd, Pwd, Exit, Jobs, Kill }

/// What the caller should do once a builtin returns.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow { Continue(i32), Exit(i32) }

type Handler = fn(&mut global::State, &[OsString], &mut dyn Write, &mut dyn Write) -> Flow;

impl Builtin {
	pub fn lookup(name: &OsStr) -> Option<Builtin> {
		match name.to_str()? {
			"cd" => Some(Builtin::Cd),
			"pwd" => Some(Builtin::Pwd),
			"exit" => Some(Builtin::Exit),
			"jobs" => Some(Builtin::Jobs),
			"kill" => Some(Builtin::Kill),
			_ => None,
		}
	}

	fn handler(self) -> Handler {
		match self {
			Builtin::Cd => builtin_cd,
			Builtin::Pwd => builtin_pwd,
			Builtin::Exit => builtin_exit,
			Builtin::Jobs => builtin_jobs,
			Builtin::Kill => builtin_kill,
		}
	}

	/// Runs the builtin; `arguments` excludes the command name.
	pub fn run(self, state: &mut global::State, arguments: &[OsString],
	           out: &mut dyn Write, err: &mut dyn Write) -> Flow {
		let flow = (self.handler())(state, arguments, &mut *out, &mut *err);
		let _ = out.flush();
		let _ = err.flush();
		flow
	}
}

fn builtin_cd(state: &mut global::State, arguments: &[OsString], _: &mut dyn Write, err: &mut dyn Write) -> Flow {
	let target = match arguments {
		[] => match state.home {
			Some(ref home) => OsString::from(home),
			None => {
				let _ = writeln!(err, "lish: cd: HOME not set");
				return Flow::Continue(1);
			},
		},
		[path] => path.clone(),
		_ => {
			let _ = writeln!(err, "lish: cd: too many arguments");
			return Flow::Continue(1);
		},
	};
	match unistd::chdir(target.as_os_str()) {
		Ok(()) => Flow::Continue(0),
		Err(e) => {
			let _ = writeln!(err, "lish: cd: {}: {}", target.to_string_lossy(), e.desc());
			Flow::Continue(1)
		},
	}
}

fn builtin_pwd(_: &mut global::State, _: &[OsString], out: &mut dyn Write, err: &mut dyn Write) -> Flow {
	match unistd::getcwd() {
		Ok(cwd) => {
			let _ = writeln!(out, "{}", cwd.display());
			Flow::Continue(0)
		},
		Err(e) => {
			let _ = writeln!(err, "lish: pwd: {}", e.desc());
			Flow::Continue(1)
		},
	}
}

fn builtin_exit(_: &mut global::State, arguments: &[OsString], _: &mut dyn Write, err: &mut dyn Write) -> Flow {
	match arguments.first() {
		None => Flow::Exit(0),
		Some(arg) => match arg.to_str().and_then(|a| a.parse::<i32>().ok()) {
			Some(code) => Flow::Exit(code),
			None => {
				let _ = writeln!(err, "lish: exit: {}: numeric argument required", arg.to_string_lossy());
				Flow::Exit(2)
			},
		},
	}
}

fn builtin_jobs(state: &mut global::State, _: &[OsString], out: &mut dyn Write, _: &mut dyn Write) -> Flow {
	let table = &mut state.job_table;
	table.reap();
	let mut done = vec![];
	for (slot, job) in table.iter() {
		let status = job.state();
		let _ = writeln!(out, "[{}] {:<8} {}  ({})", slot, status, job.command, job.cwd);
		if status != job::State::Running {
			done.push(slot);
		}
	}
	for slot in done {
		table.remove(slot);
	}
	Flow::Continue(0)
}

fn parse_signal(spec: &str) -> Option<Signal> {
	if let Ok(n) = spec.parse::<i32>() {
		return Signal::try_from(n).ok();
	}
	let upper = spec.to_ascii_uppercase();
	if upper.starts_with("SIG") {
		Signal::from_str(&upper).ok()
	} else {
		Signal::from_str(&format!("SIG{}", upper)).ok()
	}
}

fn parse_slot(spec: &str) -> Option<usize> {
	spec.strip_prefix('%').unwrap_or(spec).parse().ok()
}

fn builtin_kill(state: &mut global::State, arguments: &[OsString], _: &mut dyn Write, err: &mut dyn Write) -> Flow {
	let arguments: Vec<Cow<str>> = arguments.iter().map(|a| a.to_string_lossy()).collect();
	let mut sig = Signal::SIGTERM;
	let mut operands = &arguments[..];
	if let Some(first) = arguments.first() {
		if first.len() > 1 && first.starts_with('-') {
			sig = match parse_signal(&first[1 ..]) {
				Some(sig) => sig,
				None => {
					let _ = writeln!(err, "lish: kill: {}: invalid signal specification", &first[1 ..]);
					return Flow::Continue(1);
				},
			};
			operands = &arguments[1 ..];
		}
	}
	if operands.is_empty() {
		let _ = writeln!(err, "lish: kill: usage: kill [-SIGNAL] JOB...");
		return Flow::Continue(1);
	}

	let mut status = 0;
	for operand in operands {
		let job = match parse_slot(operand).and_then(|slot| state.job_table.get(slot)) {
			Some(job) if job.state() == job::State::Running => job,
			_ => {
				let _ = writeln!(err, "lish: kill: {}: no such job", operand);
				status = 1;
				continue;
			},
		};
		for pr in job.processes.iter().filter(|pr| pr.status.is_none()) {
			if let Err(e) = signal::kill(pr.pid, sig) {
				let _ = writeln!(err, "lish: kill: ({}): {}", pr.pid, e.desc());
				status = 1;
			} else {
				tracing::debug!(pid = %pr.pid, signal = ?sig, "signal sent");
			}
		}
	}
	Flow::Continue(status)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Limits;
	use nix::unistd::Pid;
	use std::process;

	fn run(state: &mut global::State, line: &[&str]) -> (Flow, String, String) {
		let builtin = Builtin::lookup(OsStr::new(line[0])).unwrap();
		let arguments: Vec<OsString> = line[1 ..].iter().map(OsString::from).collect();
		let mut out = vec![];
		let mut err = vec![];
		let flow = builtin.run(state, &arguments, &mut out, &mut err);
		(flow, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
	}

	fn push_job(state: &mut global::State, pid: i32, command: &str) -> usize {
		let mut builder = job::JobBuilder::new(1);
		builder.push(Pid::from_raw(pid));
		state.job_table.push(builder.build(command.to_string(), "~/w".to_string()).unwrap())
	}

	#[test]
	fn lookup_recognizes_only_builtins() {
		let lookup = |name: &str| Builtin::lookup(OsStr::new(name));
		assert_eq!(lookup("cd"), Some(Builtin::Cd));
		assert_eq!(lookup("kill"), Some(Builtin::Kill));
		assert_eq!(lookup("echo"), None);
		assert_eq!(lookup("CD"), None);
	}

	#[test]
	fn cd_then_pwd() {
		let dir = tempfile::tempdir().unwrap();
		let before = std::env::current_dir().unwrap();
		let mut state = global::State::new(Limits::default());
		let target = dir.path().canonicalize().unwrap();
		let (flow, _, err) = run(&mut state, &["cd", target.to_str().unwrap()]);
		assert_eq!(flow, Flow::Continue(0));
		assert_eq!(err, "");
		let (_, out, _) = run(&mut state, &["pwd"]);
		assert_eq!(out, format!("{}\n", target.display()));
		std::env::set_current_dir(before).unwrap();
	}

	#[test]
	fn cd_to_missing_directory_reports_and_continues() {
		let mut state = global::State::new(Limits::default());
		let (flow, _, err) = run(&mut state, &["cd", "/definitely/not/here"]);
		assert_eq!(flow, Flow::Continue(1));
		assert_eq!(err, "lish: cd: /definitely/not/here: No such file or directory\n");
	}

	#[test]
	fn exit_status() {
		let mut state = global::State::new(Limits::default());
		assert_eq!(run(&mut state, &["exit"]).0, Flow::Exit(0));
		assert_eq!(run(&mut state, &["exit", "3"]).0, Flow::Exit(3));
		let (flow, _, err) = run(&mut state, &["exit", "x"]);
		assert_eq!(flow, Flow::Exit(2));
		assert!(err.contains("numeric argument required"));
	}

	#[test]
	fn jobs_lists_in_slot_order_and_drops_finished() {
		let mut state = global::State::new(Limits::default());
		let child = process::Command::new("sleep").arg("5").spawn().unwrap();
		let running = push_job(&mut state, child.id() as i32, "sleep 5 &");
		// Not our child, so the first reap sees it as gone.
		push_job(&mut state, i32::MAX - 1, "ghost &");

		let (_, out, _) = run(&mut state, &["jobs"]);
		assert_eq!(out, "[0] Running  sleep 5 &  (~/w)\n[1] Done     ghost &  (~/w)\n");
		assert_eq!(state.job_table.len(), 1);

		let (flow, _, err) = run(&mut state, &["kill", "-KILL", &format!("%{}", running)]);
		assert_eq!(flow, Flow::Continue(0), "{}", err);
		assert_eq!(state.job_table.wait(running), Some(137));
	}

	#[test]
	fn kill_rejects_bad_operands() {
		let mut state = global::State::new(Limits::default());
		let (flow, _, err) = run(&mut state, &["kill"]);
		assert_eq!(flow, Flow::Continue(1));
		assert!(err.contains("usage"));
		let (flow, _, err) = run(&mut state, &["kill", "4"]);
		assert_eq!(flow, Flow::Continue(1));
		assert_eq!(err, "lish: kill: 4: no such job\n");
		let (flow, _, err) = run(&mut state, &["kill", "-NOPE", "0"]);
		assert_eq!(flow, Flow::Continue(1));
		assert!(err.contains("invalid signal"));
	}

	#[test]
	fn signal_specs() {
		assert_eq!(parse_signal("TERM"), Some(Signal::SIGTERM));
		assert_eq!(parse_signal("sigint"), Some(Signal::SIGINT));
		assert_eq!(parse_signal("9"), Some(Signal::SIGKILL));
		assert_eq!(parse_signal("0x"), None);
		assert_eq!(parse_slot("%2"), Some(2));
		assert_eq!(parse_slot("x"), None);
	}
}
