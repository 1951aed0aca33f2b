//! Content identifier extraction from request targets.

use std::sync::OnceLock;

use regex::Regex;

/// RFC 4122 versions 1 to 5, either letter case.
const UUID_PATTERN: &str =
    r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-5][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}";

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UUID_PATTERN).unwrap_or_else(|e| panic!("invalid UUID pattern: {e}")))
}

/// All UUIDs in `uri`, left to right, non-overlapping, case preserved.
pub fn uuids_in(uri: &str) -> Vec<&str> {
    uuid_regex().find_iter(uri).map(|m| m.as_str()).collect()
}
