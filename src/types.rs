use std::ffi::{OsStr, OsString};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode { Truncate, Append }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
	pub arguments: Vec<OsString>,
	pub input: Option<OsString>,
	pub output: Option<OsString>,
	pub mode: OutputMode,
}

impl Stage {
	pub fn new(arguments: Vec<OsString>) -> Stage {
		Stage { arguments: arguments, input: None, output: None, mode: OutputMode::Truncate }
	}

	pub fn name(&self) -> &OsStr {
		self.arguments.first().map_or(OsStr::new(""), |s| s.as_os_str())
	}

	pub fn has_redirects(&self) -> bool {
		self.input.is_some() || self.output.is_some()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
	pub stages: Vec<Stage>,
	pub is_background: bool,
}

impl Pipeline {
	pub fn is_empty(&self) -> bool {
		self.stages.is_empty()
	}
}

/// Non-UTF-8 bytes are shown as U+FFFD; the stage itself keeps them.
impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, argument) in self.arguments.iter().enumerate() {
			if i > 0 {
				f.write_str(" ")?;
			}
			write!(f, "{}", argument.to_string_lossy())?;
		}
		if let Some(ref input) = self.input {
			write!(f, " < {}", input.to_string_lossy())?;
		}
		if let Some(ref output) = self.output {
			let op = match self.mode {
				OutputMode::Truncate => ">",
				OutputMode::Append => ">>",
			};
			write!(f, " {} {}", op, output.to_string_lossy())?;
		}
		Ok(())
	}
}

impl fmt::Display for Pipeline {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, stage) in self.stages.iter().enumerate() {
			if i > 0 {
				f.write_str(" | ")?;
			}
			write!(f, "{}", stage)?;
		}
		if self.is_background {
			f.write_str(" &")?;
		}
		Ok(())
	}
}
