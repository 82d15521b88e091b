//! Directory name sanitization for checkouts.

use std::sync::LazyLock;

use regex::Regex;

/// Runs of characters outside `[0-9A-Za-z.-]`, underscores included.
static DISALLOWED_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z.\-]+").ok());

/// Make `name` safe to use as a single directory name.
///
/// Keeps `[0-9A-Za-z_.-]`, replaces every other character (path separators
/// included) with `_` and collapses runs of `_`. Names that would resolve to
/// the current or parent directory become `_`. Idempotent.
pub fn sanitize_path(name: &str) -> String {
    let sanitized = DISALLOWED_RE
        .as_ref()
        .map(|re| re.replace_all(name, "_").into_owned())
        .unwrap_or_default();

    match sanitized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => sanitized,
    }
}
