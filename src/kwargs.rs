//! Keyword argument extraction for control-port event lines.
//!
//! Tor appends optional `KEY=value` and `KEY="quoted value"` attributes to
//! many event and `GETINFO` lines, for example:
//!
//! ```text
//! 7 BUILT $AAAA~relay1,$BBBB~relay2 BUILD_FLAGS=NEED_CAPACITY PURPOSE=HS_SERVICE_INTRO TIME_CREATED=2024-01-01T00:00:00.000000
//! ```
//!
//! [`parse_keyword_args`] peels those attributes off the end of the line,
//! rightmost first, until the remainder no longer ends in one. Quoted
//! values may contain spaces. The parser knows nothing about which keys
//! matter; callers pick what they need and supply their own defaults.
//!
//! # Example
//!
//! ```rust
//! use circmon_rs::kwargs::parse_keyword_args;
//!
//! let parsed = parse_keyword_args(r#"5 BUILT REASON="closed by user" PURPOSE=GENERAL"#);
//! assert_eq!(parsed.remainder, "5 BUILT");
//! assert_eq!(parsed.get("PURPOSE"), Some("GENERAL"));
//! assert_eq!(parsed.get("REASON"), Some("closed by user"));
//! assert_eq!(parsed.get("HS_STATE"), None);
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static QUOTED_KW_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(.*) ([A-Za-z0-9_]+)="(.*)"$"#).expect("quoted keyword pattern is valid")
});

static KW_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*) ([A-Za-z0-9_]+)=(\S*)$").expect("keyword pattern is valid")
});

/// Result of [`parse_keyword_args`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordArgs {
    /// The line with every trailing keyword argument removed.
    pub remainder: String,
    /// Extracted arguments by key.
    pub args: BTreeMap<String, String>,
}

impl KeywordArgs {
    /// Returns the value for `key`, if the line carried it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// Returns the value for `key` or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

/// Extracts trailing keyword arguments from `content`.
///
/// Each round matches the rightmost `KEY="quoted"` segment, falling back to
/// `KEY=value` when the line does not end in a quote, records it and
/// continues on the text before it. The separating space is consumed with
/// the match, so the remainder never carries a trailing separator.
pub fn parse_keyword_args(content: &str) -> KeywordArgs {
    let mut args = BTreeMap::new();
    let mut rest = content;

    loop {
        let captures = QUOTED_KW_ARG
            .captures(rest)
            .or_else(|| KW_ARG.captures(rest));

        let Some(caps) = captures else {
            break;
        };

        let (Some(prefix), Some(key), Some(value)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            break;
        };

        args.insert(key.as_str().to_string(), value.as_str().to_string());
        rest = &rest[..prefix.end()];
    }

    KeywordArgs {
        remainder: rest.to_string(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_and_plain_args() {
        let parsed = parse_keyword_args(r#"prefix KEY1="a b" KEY2=c"#);
        assert_eq!(parsed.remainder, "prefix");
        assert_eq!(parsed.get("KEY1"), Some("a b"));
        assert_eq!(parsed.get("KEY2"), Some("c"));
        assert_eq!(parsed.args.len(), 2);
    }

    #[test]
    fn test_no_args() {
        let parsed = parse_keyword_args("12 LAUNCHED");
        assert_eq!(parsed.remainder, "12 LAUNCHED");
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn test_circuit_status_line() {
        let line = "7 BUILT $AAAA~relay1,$BBBB~relay2 BUILD_FLAGS=NEED_CAPACITY PURPOSE=HS_SERVICE_INTRO HS_STATE=HSSI_ESTABLISHED TIME_CREATED=2024-01-01T00:00:00.000000";
        let parsed = parse_keyword_args(line);
        assert_eq!(parsed.remainder, "7 BUILT $AAAA~relay1,$BBBB~relay2");
        assert_eq!(parsed.get("PURPOSE"), Some("HS_SERVICE_INTRO"));
        assert_eq!(parsed.get("HS_STATE"), Some("HSSI_ESTABLISHED"));
        assert_eq!(parsed.get("BUILD_FLAGS"), Some("NEED_CAPACITY"));
    }

    #[test]
    fn test_empty_value() {
        let parsed = parse_keyword_args("3 EXTENDED REASON=");
        assert_eq!(parsed.remainder, "3 EXTENDED");
        assert_eq!(parsed.get("REASON"), Some(""));
    }

    #[test]
    fn test_leading_arg_without_space_is_not_matched() {
        // Every match needs a separating space before the key.
        let parsed = parse_keyword_args("PURPOSE=GENERAL");
        assert_eq!(parsed.remainder, "PURPOSE=GENERAL");
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn test_get_or_default() {
        let parsed = parse_keyword_args("9 BUILT");
        assert_eq!(parsed.get_or("PURPOSE", ""), "");
        assert_eq!(parsed.get_or("PURPOSE", "GENERAL"), "GENERAL");
    }

    #[test]
    fn test_quoted_preferred_at_end() {
        let parsed = parse_keyword_args(r#"1 FAILED REASON="x=y z""#);
        assert_eq!(parsed.get("REASON"), Some("x=y z"));
        assert_eq!(parsed.remainder, "1 FAILED");
    }
}
