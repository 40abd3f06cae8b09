use std::fmt;

use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State { Running, Done(i32) }

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			State::Running => f.pad("Running"),
			State::Done(_) => f.pad("Done"),
		}
	}
}

pub trait WaitStatusExt {
	fn exit_code(self) -> Option<i32>;
}

impl WaitStatusExt for WaitStatus {
	fn exit_code(self) -> Option<i32> {
		match self {
			WaitStatus::Exited(_, code) => Some(code),
			WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub status: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Job {
	pub processes: Vec<Process>,
	pub command: String,
	pub cwd: String,
}

impl Job {
	/// The last stage stands for the whole pipeline.
	pub fn pid(&self) -> Pid {
		self.representative().pid
	}

	fn representative(&self) -> &Process {
		&self.processes[self.processes.len() - 1]
	}

	pub fn state(&self) -> State {
		if self.processes.iter().any(|pr| pr.status.is_none()) {
			State::Running
		} else {
			State::Done(self.representative().status.unwrap_or(0))
		}
	}

	fn record(&mut self, pid: Pid, code: i32) {
		if let Some(pr) = self.processes.iter_mut().find(|pr| pr.pid == pid) {
			pr.status = Some(code);
		}
	}
}

#[derive(Debug, Default)]
pub struct JobBuilder {
	pids: Vec<Pid>,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder { pids: Vec::with_capacity(size_hint) }
	}

	/// Forks and, in the parent, remembers the child as part of this job.
	pub fn push_fork(&mut self) -> nix::Result<unistd::ForkResult> {
		// The shell is single threaded.
		let r = unsafe { unistd::fork() }?;
		if let unistd::ForkResult::Parent { child } = r {
			self.pids.push(child);
		}
		Ok(r)
	}

	#[cfg(test)]
	pub(crate) fn push(&mut self, pid: Pid) {
		self.pids.push(pid);
	}

	pub fn is_empty(&self) -> bool {
		self.pids.is_empty()
	}

	pub fn build(self, command: String, cwd: String) -> Option<Job> {
		if self.pids.is_empty() {
			return None;
		}
		let processes = self.pids.into_iter().map(|pid| Process { pid: pid, status: None }).collect();
		Some(Job { processes: processes, command: command, cwd: cwd })
	}
}

/// Launched pipelines, indexed by slot. Slots past the last live job are dropped eagerly.
#[derive(Debug, Default)]
pub struct JobTable {
	jobs: Vec<Option<Job>>,
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable { jobs: vec![] }
	}

	pub fn push(&mut self, job: Job) -> usize {
		debug_assert!(!self.iter().any(|(_, j)| j.state() == State::Running && j.pid() == job.pid()));
		self.jobs.push(Some(job));
		self.jobs.len() - 1
	}

	pub fn remove(&mut self, slot: usize) -> Option<Job> {
		let job = self.jobs.get_mut(slot).and_then(|o| o.take());
		if job.is_some() && slot + 1 == self.jobs.len() {
			let len = self.jobs.iter().rposition(|o| o.is_some()).map_or(0, |i| i + 1);
			self.jobs.truncate(len);
		}
		job
	}

	pub fn get(&self, slot: usize) -> Option<&Job> {
		self.jobs.get(slot).and_then(|o| o.as_ref())
	}

	/// Live jobs, oldest first.
	pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
		self.jobs.iter().enumerate().filter_map(|(i, o)| o.as_ref().map(|job| (i, job)))
	}

	pub fn len(&self) -> usize {
		self.iter().count()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}

	/// Number of slots currently held, live or not.
	#[cfg(test)]
	pub(crate) fn capacity_used(&self) -> usize {
		self.jobs.len()
	}

	/// Blocks until every process of the job has exited and returns the
	/// representative's status.
	pub fn wait(&mut self, slot: usize) -> Option<i32> {
		let job = self.jobs.get_mut(slot).and_then(|o| o.as_mut())?;
		let pending: Vec<Pid> = job.processes.iter().filter(|pr| pr.status.is_none()).map(|pr| pr.pid).collect();
		for pid in pending {
			let code = loop {
				match wait::waitpid(pid, None) {
					Ok(status) => match status.exit_code() {
						Some(code) => break code,
						None => continue,
					},
					Err(Errno::EINTR) => continue,
					Err(e) => {
						tracing::warn!(%pid, error = %e, "waitpid failed");
						break 0;
					},
				}
			};
			tracing::debug!(%pid, code, "process exited");
			job.record(pid, code);
		}
		match job.state() {
			State::Done(code) => Some(code),
			State::Running => None,
		}
	}

	/// Polls live jobs without blocking; returns the slots that finished during this call.
	pub fn reap(&mut self) -> Vec<usize> {
		let mut finished = vec![];
		for (slot, entry) in self.jobs.iter_mut().enumerate() {
			let job = match entry.as_mut() {
				Some(job) if job.state() == State::Running => job,
				_ => continue,
			};
			let pending: Vec<Pid> = job.processes.iter().filter(|pr| pr.status.is_none()).map(|pr| pr.pid).collect();
			for pid in pending {
				match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
					Ok(status) => if let Some(code) = status.exit_code() {
						job.record(pid, code);
					},
					Err(Errno::ECHILD) => job.record(pid, 0),
					Err(e) => tracing::warn!(%pid, error = %e, "waitpid failed"),
				}
			}
			if job.state() != State::Running {
				finished.push(slot);
			}
		}
		finished
	}
}
