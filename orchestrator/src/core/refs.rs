//! Parsing of raw issue references declared on board items.

use std::sync::LazyLock;

use regex::Regex;

static ISSUE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#?(\d+)\s*$").expect("issue ref regex is valid"));

/// Parse `"#12"` or `"12"` into an issue number.
///
/// Returns `None` for anything else, including `#0`.
pub fn parse_issue_ref(raw: &str) -> Option<u64> {
    let caps = ISSUE_REF_RE.captures(raw)?;
    caps.get(1)?
        .as_str()
        .parse::<u64>()
        .ok()
        .filter(|number| *number > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hash_and_bare_numbers() {
        assert_eq!(parse_issue_ref("#12"), Some(12));
        assert_eq!(parse_issue_ref(" 7 "), Some(7));
    }

    #[test]
    fn rejects_non_numeric_refs() {
        for raw in ["#", "abc", "#12a", "owner/repo#3", "#0", ""] {
            assert_eq!(parse_issue_ref(raw), None, "{raw}");
        }
    }
}
