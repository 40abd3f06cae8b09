use std::io::{self, BufRead, Write};

use crate::eval::{self, EvalResult};
use crate::global;
use crate::parser;
use crate::prompt::Prompt;

pub const PARSE_ERROR_STATUS: i32 = 2;

fn report_finished(state: &mut global::State, err: &mut dyn Write) {
	for slot in state.job_table.reap() {
		if let Some(job) = state.job_table.remove(slot) {
			let _ = writeln!(err, "[{}] Done  {}", slot, job.command);
		}
	}
}

/// Parses and evaluates one line. A line that fails to parse runs nothing.
pub fn run_line(state: &mut global::State, line: &[u8]) -> EvalResult {
	match parser::parse(line, &state.limits) {
		Ok(pipeline) => eval::eval(state, &pipeline),
		Err(e) => {
			let _ = writeln!(io::stderr(), "lish: {}", e);
			EvalResult::Done(PARSE_ERROR_STATUS)
		},
	}
}

/// Reads lines until the input is exhausted or `exit` runs, returning the
/// status of the last command.
pub fn run<R: BufRead>(state: &mut global::State, mut input: R, prompt: Option<&Prompt>) -> i32 {
	let mut status = 0;
	let mut line: Vec<u8> = vec![];
	loop {
		report_finished(state, &mut io::stderr());
		if let Some(prompt) = prompt {
			let mut stdout = io::stdout();
			let _ = stdout.write_all(prompt.render_for(state).as_bytes());
			let _ = stdout.flush();
		}

		line.clear();
		match input.read_until(b'\n', &mut line) {
			Ok(0) => break,
			Ok(_) => {},
			Err(e) => {
				let _ = writeln!(io::stderr(), "lish: {}", e);
				status = 1;
				break;
			},
		}

		match run_line(state, &line) {
			EvalResult::Done(code) => status = code,
			EvalResult::Background(slot) => {
				status = 0;
				if let (Some(_), Some(job)) = (prompt, state.job_table.get(slot)) {
					let _ = writeln!(io::stderr(), "[{}] {}", slot, job.pid());
				}
			},
			EvalResult::Exit(code) => return code,
		}
	}
	if prompt.is_some() {
		println!();
	}
	status
}
