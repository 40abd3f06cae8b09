use anyhow::{anyhow, Result};
use nix::unistd;

use crate::global;

pub struct Prompt {
	user: String,
	host: String,
}

impl Prompt {
	pub fn new() -> Result<Prompt> {
		let uid = unistd::geteuid();
		let user = match unistd::User::from_uid(uid) {
			Ok(Some(user)) => user.name,
			_ => return Err(anyhow!("cannot find username for UID {}", uid)),
		};
		let host = unistd::gethostname()
			.map(|h| h.to_string_lossy().into_owned())
			.unwrap_or_default();
		Ok(Prompt { user: user, host: host })
	}

	pub fn render(&self, cwd: &str) -> String {
		format!("{}@{}:{}$ ", self.user, self.host, cwd)
	}

	pub fn render_for(&self, state: &global::State) -> String {
		self.render(&state.cwd_label())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_user_host_and_cwd() {
		let prompt = Prompt { user: "al".to_string(), host: "box".to_string() };
		assert_eq!(prompt.render("~/src"), "al@box:~/src$ ");
	}
}
