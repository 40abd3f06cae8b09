use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use nix::unistd::{self, AccessFlags};

use crate::text;

pub const PATH_KEY: &str = "PATH";

pub fn join(dir: &OsStr, name: &OsStr) -> OsString {
	if dir.is_empty() {
		return name.to_os_string();
	}
	let dir = text::rtrim(dir.as_bytes(), b"/");
	let name = text::ltrim(name.as_bytes(), b"/");
	let mut joined = Vec::with_capacity(dir.len() + name.len() + 1);
	joined.extend_from_slice(dir);
	joined.push(b'/');
	joined.extend_from_slice(name);
	OsString::from_vec(joined)
}

pub fn trim_separators(path: &str) -> &str {
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() && !path.is_empty() {
		"/"
	} else {
		trimmed
	}
}

/// Replaces a leading `home` component of `cwd` with `~`.
pub fn alias_home(cwd: &str, home: &str) -> String {
	let home = trim_separators(home);
	if home.is_empty() || home == "/" {
		return cwd.to_string();
	}
	if cwd == home {
		return "~".to_string();
	}
	match cwd.strip_prefix(home) {
		Some(rest) if text::starts_with(rest.as_bytes(), b"/") => format!("~{}", rest),
		_ => cwd.to_string(),
	}
}

fn is_executable_file(path: &Path) -> bool {
	match fs::metadata(path) {
		Ok(meta) => meta.is_file() && unistd::access(path, AccessFlags::X_OK).is_ok(),
		Err(_) => false,
	}
}

/// Looks `name` up in the colon-separated `path_var`, first match wins.
pub fn resolve(name: &OsStr, path_var: &OsStr) -> Option<PathBuf> {
	if name.as_bytes().contains(&b'/') {
		return Some(PathBuf::from(name));
	}
	if name.is_empty() {
		return None;
	}
	env::split_paths(path_var)
		.map(|dir| PathBuf::from(join(dir.as_os_str(), name)))
		.find(|candidate| is_executable_file(candidate))
}

pub fn resolve_from_env(name: &OsStr) -> Option<PathBuf> {
	let path_var = env::var_os(PATH_KEY).unwrap_or_default();
	resolve(name, &path_var)
}
