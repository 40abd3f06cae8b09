use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use thiserror::Error;

use crate::config::Limits;
use crate::text::{self, WHITE_CHARS};
use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("syntax error: expected a path after '{operator}'")]
	MissingTarget { operator: &'static str },
	#[error("syntax error: empty command")]
	EmptyCommand,
	#[error("too many commands in pipeline (limit {limit})")]
	TooManyStages { limit: usize },
	#[error("too many arguments (limit {limit})")]
	TooManyArguments { limit: usize },
	#[error("path too long (limit {limit} bytes)")]
	PathTooLong { limit: usize },
}

type ParseResult<T> = Result<T, ParseError>;

struct Parser<'a> {
	limits: &'a Limits,
}

impl<'a> Parser<'a> {
	fn check_path(&self, word: &[u8]) -> ParseResult<()> {
		if word.len() > self.limits.max_path {
			return Err(ParseError::PathTooLong { limit: self.limits.max_path });
		}
		Ok(())
	}

	fn read_target<'t, I>(&self, operator: &'static str, words: &mut I) -> ParseResult<OsString>
		where I: Iterator<Item = &'t [u8]> {
		let target = words.next().ok_or(ParseError::MissingTarget { operator: operator })?;
		self.check_path(target)?;
		Ok(OsStr::from_bytes(target).to_os_string())
	}

	fn parse_stage(&self, raw: &[u8]) -> ParseResult<Stage> {
		let mut stage = Stage::new(vec![]);
		let mut words = text::fields(raw);
		while let Some(word) = words.next() {
			match word {
				b">" => {
					stage.output = Some(self.read_target(">", &mut words)?);
					stage.mode = OutputMode::Truncate;
				},
				b">>" => {
					stage.output = Some(self.read_target(">>", &mut words)?);
					stage.mode = OutputMode::Append;
				},
				b"<" => {
					stage.input = Some(self.read_target("<", &mut words)?);
				},
				_ => {
					if stage.arguments.len() == self.limits.max_args {
						return Err(ParseError::TooManyArguments { limit: self.limits.max_args });
					}
					self.check_path(word)?;
					stage.arguments.push(OsStr::from_bytes(word).to_os_string());
				},
			}
		}
		if stage.arguments.is_empty() {
			return Err(ParseError::EmptyCommand);
		}
		Ok(stage)
	}

	fn parse_pipeline(&self, line: &[u8]) -> ParseResult<Pipeline> {
		let mut line = text::trim(line, WHITE_CHARS);
		let mut is_background = false;
		if text::ends_with(line, b"&") {
			is_background = true;
			line = text::rtrim(&line[.. line.len() - 1], WHITE_CHARS);
		}

		let mut stages: Vec<Stage> = vec![];
		if line.is_empty() {
			return Ok(Pipeline { stages: stages, is_background: is_background });
		}
		for raw in line.split(|&c| c == b'|') {
			if stages.len() == self.limits.max_stages {
				return Err(ParseError::TooManyStages { limit: self.limits.max_stages });
			}
			stages.push(self.parse_stage(raw)?);
		}
		Ok(Pipeline { stages: stages, is_background: is_background })
	}
}

/// Parses one raw input line. Words are kept as bytes, so arguments and
/// redirection targets need not be UTF-8.
pub fn parse(line: &[u8], limits: &Limits) -> ParseResult<Pipeline> {
	let parser = Parser { limits: limits };
	let pipeline = parser.parse_pipeline(line)?;
	tracing::debug!(stages = pipeline.stages.len(), background = pipeline.is_background, "parsed line");
	Ok(pipeline)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn p(line: &str) -> ParseResult<Pipeline> {
		parse(line.as_bytes(), &Limits::default())
	}

	fn argv(stage: &Stage) -> Vec<&str> {
		stage.arguments.iter().map(|s| s.to_str().unwrap()).collect()
	}

	fn os(s: &str) -> Option<&OsStr> {
		Some(OsStr::new(s))
	}

	#[test]
	fn single_command() {
		let pl = p("echo hi").unwrap();
		assert_eq!(pl.stages.len(), 1);
		assert_eq!(argv(&pl.stages[0]), ["echo", "hi"]);
		assert!(!pl.stages[0].has_redirects());
		assert!(!pl.is_background);
	}

	#[test]
	fn background_flag_strips_ampersand() {
		for line in &["ls | wc -l &", "ls | wc -l   &", "ls | wc -l\t&\n", "ls | wc -l&"] {
			let pl = p(line).unwrap();
			assert!(pl.is_background, "{:?}", line);
			assert_eq!(pl.stages.len(), 2);
			assert_eq!(argv(&pl.stages[0]), ["ls"]);
			assert_eq!(argv(&pl.stages[1]), ["wc", "-l"]);
		}
	}

	#[test]
	fn stages_follow_textual_order() {
		let pl = p("a 1 | b 2 | c 3 | d").unwrap();
		let names: Vec<&str> = pl.stages.iter().map(|s| s.name().to_str().unwrap()).collect();
		assert_eq!(names, ["a", "b", "c", "d"]);
	}

	#[test]
	fn redirections() {
		let pl = p("cat < in.txt > out.txt").unwrap();
		let stage = &pl.stages[0];
		assert_eq!(argv(stage), ["cat"]);
		assert_eq!(stage.input.as_deref(), os("in.txt"));
		assert_eq!(stage.output.as_deref(), os("out.txt"));
		assert_eq!(stage.mode, OutputMode::Truncate);

		let pl = p("sort >> log < data | uniq").unwrap();
		assert_eq!(pl.stages[0].mode, OutputMode::Append);
		assert_eq!(pl.stages[0].output.as_deref(), os("log"));
		assert_eq!(pl.stages[0].input.as_deref(), os("data"));
		assert_eq!(pl.stages[1].output, None);
	}

	#[test]
	fn last_redirection_wins() {
		let pl = p("echo x > a >> b").unwrap();
		assert_eq!(pl.stages[0].output.as_deref(), os("b"));
		assert_eq!(pl.stages[0].mode, OutputMode::Append);
	}

	#[test]
	fn empty_lines_are_noops() {
		assert!(p("").unwrap().is_empty());
		assert!(p(" \t\r\n").unwrap().is_empty());
		assert!(p("&").unwrap().is_empty());
	}

	#[test]
	fn keeps_non_utf8_words_verbatim() {
		let pl = parse(b"cat f\xff | tee > g\xfe\n", &Limits::default()).unwrap();
		assert_eq!(pl.stages[0].arguments[1].as_bytes(), b"f\xff");
		assert_eq!(pl.stages[1].output.as_ref().map(|o| o.as_bytes()), Some(&b"g\xfe"[..]));
	}

	#[test]
	fn malformed_redirection() {
		assert_eq!(p("ls >"), Err(ParseError::MissingTarget { operator: ">" }));
		assert_eq!(p("ls >> "), Err(ParseError::MissingTarget { operator: ">>" }));
		assert_eq!(p("wc < | ls"), Err(ParseError::MissingTarget { operator: "<" }));
	}

	#[test]
	fn empty_stages_are_rejected() {
		assert_eq!(p("> out"), Err(ParseError::EmptyCommand));
		assert_eq!(p("ls | | wc"), Err(ParseError::EmptyCommand));
		assert_eq!(p("ls |"), Err(ParseError::EmptyCommand));
	}

	#[test]
	fn limits_are_enforced() {
		let limits = Limits { max_stages: 2, max_args: 3, max_path: 8 };
		assert!(parse(b"a | b", &limits).is_ok());
		assert_eq!(parse(b"a | b | c", &limits), Err(ParseError::TooManyStages { limit: 2 }));
		assert!(parse(b"a b c", &limits).is_ok());
		assert_eq!(parse(b"a b c d", &limits), Err(ParseError::TooManyArguments { limit: 3 }));
		assert_eq!(parse(b"cat > verylongname", &limits), Err(ParseError::PathTooLong { limit: 8 }));
		assert_eq!(parse(b"verylongname", &limits), Err(ParseError::PathTooLong { limit: 8 }));
	}

	#[test]
	fn display_reparses_to_same_arguments() {
		for line in &["ls -l", "a  b\tc |  d e", "grep -v x | sort | uniq -c"] {
			let pl = p(line).unwrap();
			let again = p(&pl.to_string()).unwrap();
			assert_eq!(pl, again);
		}
		let pl = p("cat<in").unwrap();
		assert_eq!(argv(&pl.stages[0]), ["cat<in"]);
	}

	#[test]
	fn display_renders_canonical_line() {
		let pl = p("  sort < a   >> b |  wc   &").unwrap();
		assert_eq!(pl.to_string(), "sort < a >> b | wc &");
	}
}
