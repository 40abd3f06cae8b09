use std::ffi::{self, CString, OsStr};
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::unistd;
use thiserror::Error;

use crate::builtin::{Builtin, Flow};
use crate::global;
use crate::job;
use crate::search;
use crate::types::*;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("{}", .0.desc())]
	Nix(#[from] nix::Error),
	#[error("argument contains a nul byte")]
	Nul(#[from] ffi::NulError),
	#[error("{path}: {}", .source.desc())]
	Redirect { path: String, source: nix::Error },
	#[error("{0}: command not found")]
	NotFound(String),
	#[error("{name}: {}", .source.desc())]
	Exec { name: String, source: nix::Error },
}

impl ExecError {
	pub fn status(&self) -> i32 {
		match *self {
			ExecError::NotFound(_) => 127,
			ExecError::Exec { .. } | ExecError::Nul(_) => 126,
			ExecError::Nix(_) | ExecError::Redirect { .. } => 1,
		}
	}
}

/// Where a stage reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
	Terminal,
	Link(usize),
	File(&'a OsStr),
}

/// Where a stage writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink<'a> {
	Terminal,
	Link(usize),
	File(&'a OsStr, OutputMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan<'a> {
	pub stdin: Source<'a>,
	pub stdout: Sink<'a>,
}

/// Descriptor wiring of a whole pipeline. Link `k` carries stage `k`'s
/// output to stage `k + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<'a> {
	pub stages: Vec<StagePlan<'a>>,
	pub links: usize,
}

pub fn plan(pipeline: &Pipeline) -> Plan {
	let n = pipeline.stages.len();
	let stages = pipeline.stages.iter().enumerate().map(|(i, stage)| {
		let stdin = match stage.input {
			Some(ref path) => Source::File(path),
			None if i > 0 => Source::Link(i - 1),
			None => Source::Terminal,
		};
		let stdout = match stage.output {
			Some(ref path) => Sink::File(path, stage.mode),
			None if i + 1 < n => Sink::Link(i),
			None => Sink::Terminal,
		};
		StagePlan { stdin: stdin, stdout: stdout }
	}).collect();
	Plan { stages: stages, links: n.saturating_sub(1) }
}

/// Pipe pairs, `None` where creating the pipe failed.
struct Links {
	ends: Vec<Option<(OwnedFd, OwnedFd)>>,
}

impl Links {
	fn open(count: usize) -> Links {
		let ends = (0 .. count).map(|k| match unistd::pipe() {
			Ok(pair) => Some(pair),
			Err(e) => {
				tracing::warn!(link = k, error = %e, "pipe failed, stages run unlinked");
				None
			},
		}).collect();
		Links { ends: ends }
	}

	fn read_end(&self, k: usize) -> Option<RawFd> {
		self.ends.get(k).and_then(|o| o.as_ref()).map(|&(ref r, _)| r.as_raw_fd())
	}

	fn write_end(&self, k: usize) -> Option<RawFd> {
		self.ends.get(k).and_then(|o| o.as_ref()).map(|&(_, ref w)| w.as_raw_fd())
	}

	fn close_all(&mut self) {
		self.ends.clear();
	}
}

enum Program {
	Builtin(Builtin),
	External { name: String, path: CString, argv: Vec<CString> },
}

fn prepare(stage: &Stage) -> Result<Program, ExecError> {
	let name = stage.name();
	if let Some(builtin) = Builtin::lookup(name) {
		return Ok(Program::Builtin(builtin));
	}
	let path = match search::resolve_from_env(name) {
		Some(path) => CString::new(path.as_os_str().as_bytes())?,
		None => CString::new(name.as_bytes())?,
	};
	let argv: Result<Vec<CString>, ffi::NulError> = stage.arguments.iter().map(|s| CString::new(s.as_bytes())).collect();
	Ok(Program::External { name: name.to_string_lossy().into_owned(), path: path, argv: argv? })
}

fn open_input(path: &OsStr) -> Result<RawFd, ExecError> {
	fcntl::open(path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
		.map_err(|e| ExecError::Redirect { path: path.to_string_lossy().into_owned(), source: e })
}

fn open_output(path: &OsStr, mode: OutputMode) -> Result<RawFd, ExecError> {
	let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_CLOEXEC | match mode {
		OutputMode::Truncate => OFlag::O_TRUNC,
		OutputMode::Append => OFlag::O_APPEND,
	};
	// rw-rw-r--, before umask
	let perm = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP | Mode::S_IROTH;
	fcntl::open(path, flags, perm)
		.map_err(|e| ExecError::Redirect { path: path.to_string_lossy().into_owned(), source: e })
}

fn redirect_to(fd: RawFd, target: RawFd) -> Result<(), ExecError> {
	unistd::dup2(fd, target)?;
	unistd::close(fd)?;
	Ok(())
}

fn wire(plan: &StagePlan, links: &mut Links) -> Result<(), ExecError> {
	match plan.stdin {
		Source::File(path) => redirect_to(open_input(path)?, libc::STDIN_FILENO)?,
		Source::Link(k) => if let Some(fd) = links.read_end(k) {
			unistd::dup2(fd, libc::STDIN_FILENO)?;
		},
		Source::Terminal => {},
	}
	match plan.stdout {
		Sink::File(path, mode) => redirect_to(open_output(path, mode)?, libc::STDOUT_FILENO)?,
		Sink::Link(k) => if let Some(fd) = links.write_end(k) {
			unistd::dup2(fd, libc::STDOUT_FILENO)?;
		},
		Sink::Terminal => {},
	}
	Ok(())
}

/// Keyboard signals an interactive shell leaves to its foreground stages.
const KEYBOARD_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGQUIT];

pub fn ignore_keyboard_signals() -> nix::Result<()> {
	for &sig in KEYBOARD_SIGNALS.iter() {
		unsafe { signal::signal(sig, SigHandler::SigIgn) }?;
	}
	Ok(())
}

// Ignored signals survive exec, and the Rust runtime ignores SIGPIPE.
fn restore_signals(keyboard: bool) -> nix::Result<()> {
	unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) }?;
	if keyboard {
		for &sig in KEYBOARD_SIGNALS.iter() {
			unsafe { signal::signal(sig, SigHandler::SigDfl) }?;
		}
	}
	Ok(())
}

fn do_run_stage(state: &mut global::State, stage: &Stage, plan: &StagePlan,
                program: &Program, links: &mut Links) -> Result<i32, ExecError> {
	let wired = wire(plan, links);
	links.close_all();
	wired?;
	match *program {
		Program::Builtin(builtin) => {
			let stdout = io::stdout();
			let stderr = io::stderr();
			let flow = builtin.run(state, &stage.arguments[1 ..], &mut stdout.lock(), &mut stderr.lock());
			match flow {
				Flow::Continue(code) | Flow::Exit(code) => Ok(code),
			}
		},
		Program::External { ref name, ref path, ref argv } => {
			let e = match unistd::execv(path, argv) {
				Ok(never) => match never {},
				Err(e) => e,
			};
			match e {
				Errno::ENOENT => Err(ExecError::NotFound(name.clone())),
				e => Err(ExecError::Exec { name: name.clone(), source: e }),
			}
		},
	}
}

fn run_stage(state: &global::State, pipeline: &Pipeline, i: usize, plan: &StagePlan,
             program: &Program, links: &mut Links) -> ! {
	// Background stages keep ignoring keyboard signals.
	let keyboard = state.ignores_keyboard && !pipeline.is_background;
	let mut state = state.for_child();
	let result = restore_signals(keyboard)
		.map_err(ExecError::from)
		.and_then(|()| do_run_stage(&mut state, &pipeline.stages[i], plan, program, links));
	let code = result.unwrap_or_else(|e| {
		let _ = writeln!(io::stderr(), "lish: {}", e);
		e.status()
	});
	let _ = io::stdout().flush();
	unsafe { libc::_exit(code) }
}

fn spawn_stages(state: &global::State, pipeline: &Pipeline, programs: &[Program],
                job_builder: &mut job::JobBuilder) -> Result<(), ExecError> {
	let plan = plan(pipeline);
	let mut links = Links::open(plan.links);
	let _ = io::stdout().flush();
	for i in 0 .. pipeline.stages.len() {
		match job_builder.push_fork() {
			Ok(unistd::ForkResult::Parent { child }) => {
				tracing::debug!(stage = i, pid = %child, stdin = ?plan.stages[i].stdin, stdout = ?plan.stages[i].stdout, "forked");
			},
			Ok(unistd::ForkResult::Child) => {
				run_stage(state, pipeline, i, &plan.stages[i], &programs[i], &mut links);
			},
			Err(e) if job_builder.is_empty() => {
				return Err(e.into());
			},
			Err(e) => {
				tracing::warn!(stage = i, error = %e, "fork failed, stage skipped");
			},
		}
	}
	links.close_all();
	Ok(())
}

fn launch(state: &mut global::State, pipeline: &Pipeline) -> Result<usize, ExecError> {
	let programs: Vec<Program> = pipeline.stages.iter().map(prepare).collect::<Result<_, _>>()?;
	let mut job_builder = job::JobBuilder::new(pipeline.stages.len());
	spawn_stages(state, pipeline, &programs, &mut job_builder)?;
	let job = match job_builder.build(pipeline.to_string(), state.cwd_label()) {
		Some(job) => job,
		None => return Err(ExecError::Nix(Errno::EAGAIN)),
	};
	Ok(state.job_table.push(job))
}

fn run_builtin_here(state: &mut global::State, builtin: Builtin, stage: &Stage) -> Result<Flow, ExecError> {
	if let Some(ref path) = stage.input {
		unistd::close(open_input(path)?)?;
	}
	let stderr = io::stderr();
	let mut err = stderr.lock();
	let arguments = &stage.arguments[1 ..];
	let flow = match stage.output {
		Some(ref path) => {
			let fd = open_output(path, stage.mode)?;
			let mut file = unsafe { File::from_raw_fd(fd) };
			builtin.run(state, arguments, &mut file, &mut err)
		},
		None => {
			let stdout = io::stdout();
			let mut out = stdout.lock();
			builtin.run(state, arguments, &mut out, &mut err)
		},
	};
	Ok(flow)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EvalResult {
	Done(i32),
	Background(usize),
	Exit(i32),
}

pub fn eval(state: &mut global::State, pipeline: &Pipeline) -> EvalResult {
	if pipeline.is_empty() {
		return EvalResult::Done(0);
	}

	if pipeline.stages.len() == 1 && !pipeline.is_background {
		let stage = &pipeline.stages[0];
		if let Some(builtin) = Builtin::lookup(stage.name()) {
			return match run_builtin_here(state, builtin, stage) {
				Ok(Flow::Continue(code)) => EvalResult::Done(code),
				Ok(Flow::Exit(code)) => EvalResult::Exit(code),
				Err(e) => {
					let _ = writeln!(io::stderr(), "lish: {}", e);
					EvalResult::Done(e.status())
				},
			};
		}
	}

	let slot = match launch(state, pipeline) {
		Ok(slot) => slot,
		Err(e) => {
			let _ = writeln!(io::stderr(), "lish: {}", e);
			return EvalResult::Done(e.status());
		},
	};

	if pipeline.is_background {
		if let Some(job) = state.job_table.get(slot) {
			tracing::info!(slot, pid = %job.pid(), command = %job.command, "background job started");
		}
		return EvalResult::Background(slot);
	}
	let code = state.job_table.wait(slot).unwrap_or(0);
	state.job_table.remove(slot);
	EvalResult::Done(code)
}
