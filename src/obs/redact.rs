// std
use std::sync::LazyLock;
// crates.io
use regex::Regex;

const PREVIEW_LIMIT: usize = 256;
const MASK: &str = "<redacted>";

// `key=value` and `"key": "value"`; the key must stand alone as a word.
static SENSITIVE_VALUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(concat!(
		r#"(?P<prefix>\b(?:access_token|refresh_token|client_secret|code_verifier|code)"#,
		r#""?\s*[=:]\s*"?)[^&"',;}\s]*"#,
	))
	.ok()
});

/// Masks secret-bearing values in provider-supplied text and truncates it for logging.
///
/// Recognizes `key=value` (form/query) and `"key": "value"` (JSON) shapes for
/// `access_token`, `refresh_token`, `client_secret`, `code_verifier`, and `code`.
pub fn redact(text: &str) -> String {
	let masked = match SENSITIVE_VALUE.as_ref() {
		Some(pattern) => pattern.replace_all(text, format!("${{prefix}}{MASK}")).into_owned(),
		// Without the pattern nothing can be trusted to be clean.
		None => MASK.into(),
	};

	truncate(masked)
}

fn truncate(mut text: String) -> String {
	if text.len() > PREVIEW_LIMIT {
		let mut end = PREVIEW_LIMIT;

		while !text.is_char_boundary(end) {
			end -= 1;
		}

		text.truncate(end);
		text.push_str("...");
	}

	text
}
