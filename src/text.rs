pub const WHITE_CHARS: &[u8] = b" \x0c\n\r\t\x0b";

pub fn ltrim<'a>(s: &'a [u8], set: &[u8]) -> &'a [u8] {
	let start = s.iter().position(|c| !set.contains(c)).unwrap_or(s.len());
	&s[start ..]
}

pub fn rtrim<'a>(s: &'a [u8], set: &[u8]) -> &'a [u8] {
	let end = s.iter().rposition(|c| !set.contains(c)).map_or(0, |i| i + 1);
	&s[.. end]
}

pub fn trim<'a>(s: &'a [u8], set: &[u8]) -> &'a [u8] {
	rtrim(ltrim(s, set), set)
}

pub fn starts_with(s: &[u8], prefix: &[u8]) -> bool {
	s.starts_with(prefix)
}

pub fn ends_with(s: &[u8], suffix: &[u8]) -> bool {
	s.ends_with(suffix)
}

/// Splits on runs of `WHITE_CHARS`.
pub fn fields(s: &[u8]) -> impl Iterator<Item = &[u8]> {
	s.split(|c| WHITE_CHARS.contains(c)).filter(|f| !f.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trims_control_whitespace() {
		assert_eq!(trim(b"\x0b\t ls -l \r\n", WHITE_CHARS), b"ls -l");
		assert_eq!(ltrim(b"  a  ", WHITE_CHARS), b"a  ");
		assert_eq!(rtrim(b"  a  ", WHITE_CHARS), b"  a");
		assert_eq!(trim(b" \t\n", WHITE_CHARS), b"");
	}

	#[test]
	fn trims_custom_set() {
		assert_eq!(rtrim(b"/usr/bin///", b"/"), b"/usr/bin");
		assert_eq!(trim(b"&&x&", b"&"), b"x");
	}

	#[test]
	fn leaves_non_utf8_bytes_alone() {
		assert_eq!(trim(b" f\xff\t", WHITE_CHARS), b"f\xff");
		let v: Vec<&[u8]> = fields(b"cat \xfe\xff x").collect();
		assert_eq!(v, [&b"cat"[..], b"\xfe\xff", b"x"]);
	}

	#[test]
	fn prefix_and_suffix() {
		assert!(starts_with(b"/home/al/src", b"/home/al"));
		assert!(!starts_with(b"/ho", b"/home"));
		assert!(ends_with(b"sleep 1 &", b"&"));
		assert!(starts_with(b"x", b""));
		assert!(ends_with(b"", b""));
	}

	#[test]
	fn splits_fields() {
		let v: Vec<&[u8]> = fields(b" wc\t -l\x0c x ").collect();
		assert_eq!(v, [&b"wc"[..], b"-l", b"x"]);
		assert_eq!(fields(b"   ").count(), 0);
	}
}
