//! String-or-regex matching used for page switching, wait conditions and interception.
//!
//! A [`Matcher`] written as text uses the `/source/flags` form for regular
//! expressions (`i`, `m`, `s` and `x` flags are honoured); anything else is
//! an exact string.

use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Exact string or regular expression
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Whole-string equality
    Exact(String),
    /// Unanchored regex search, with the flags it was written with
    Regex(Regex, String),
}

impl Matcher {
    /// Exact matcher
    pub fn exact<S: Into<String>>(value: S) -> Self {
        Matcher::Exact(value.into())
    }

    /// Compile a regex matcher
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Matcher::Regex(Regex::new(pattern)?, String::new()))
    }

    /// Parse the textual form: `/src/flags` becomes a regex, anything else is exact.
    pub fn parse(text: &str) -> Result<Self> {
        if let Some(rest) = text.strip_prefix('/') {
            if let Some(end) = rest.rfind('/') {
                let (source, flags) = (&rest[..end], &rest[end + 1..]);
                if flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'g' | 'u')) {
                    let mut flags: Vec<char> = flags.chars().collect();
                    flags.sort_unstable();
                    flags.dedup();
                    let flags: String = flags.into_iter().collect();
                    let regex = RegexBuilder::new(source)
                        .case_insensitive(flags.contains('i'))
                        .multi_line(flags.contains('m'))
                        .dot_matches_new_line(flags.contains('s'))
                        .ignore_whitespace(flags.contains('x'))
                        .build()?;
                    return Ok(Matcher::Regex(regex, flags));
                }
            }
        }
        Ok(Matcher::Exact(text.to_string()))
    }

    /// Test a single candidate
    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            Matcher::Exact(expected) => expected == candidate,
            Matcher::Regex(regex, _) => regex.is_match(candidate),
        }
    }

    /// Test several candidates (e.g. a page URL and its title)
    pub fn matches_any(&self, candidates: &[&str]) -> bool {
        candidates.iter().any(|c| self.is_match(c))
    }

    /// Whether this is a regular expression
    pub fn is_regex(&self) -> bool {
        matches!(self, Matcher::Regex(..))
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Matcher::Exact(a), Matcher::Exact(b)) => a == b,
            (Matcher::Regex(a, a_flags), Matcher::Regex(b, b_flags)) => a.as_str() == b.as_str() && a_flags == b_flags,
            _ => false,
        }
    }
}

impl Eq for Matcher {}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(s) => f.write_str(s),
            Matcher::Regex(r, flags) => write!(f, "/{}/{}", r.as_str(), flags),
        }
    }
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        Matcher::Exact(value.to_string())
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Matcher::Exact(value)
    }
}

impl From<Regex> for Matcher {
    fn from(value: Regex) -> Self {
        Matcher::Regex(value, String::new())
    }
}

impl Serialize for Matcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Matcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Matcher::parse(&text).map_err(|e: Error| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_is_whole_string() {
        let m = Matcher::exact("https://example.test/");
        assert!(m.is_match("https://example.test/"));
        assert!(!m.is_match("https://example.test/api"));
    }

    #[test]
    fn test_parse_regex_form() {
        let m = Matcher::parse("/exam.le\\.test/").unwrap();
        assert!(m.is_regex());
        assert!(m.is_match("https://example.test/api"));

        let ci = Matcher::parse("/GOOGLE/i").unwrap();
        assert!(ci.is_match("https://www.google.com"));
    }

    #[test]
    fn test_parse_plain_path_is_exact() {
        let m = Matcher::parse("/api/users").unwrap();
        assert_eq!(m, Matcher::exact("/api/users"));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let err = Matcher::parse("/(unclosed/").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_matches_any_checks_title_too() {
        let m = Matcher::regex("Go+gle").unwrap();
        assert!(m.matches_any(&["https://x.test", "Gooogle Search"]));
        assert!(!m.matches_any(&["https://x.test", "Bing"]));
    }

    #[test]
    fn test_serde_roundtrip_keeps_kind() {
        let m: Matcher = serde_json::from_value(serde_json::json!("/a+b/")).unwrap();
        assert!(m.is_regex());
        assert_eq!(serde_json::to_value(&m).unwrap(), serde_json::json!("/a+b/"));
    }

    #[test]
    fn test_flags_survive_compare_display_and_serde() {
        let ci = Matcher::parse("/abc/i").unwrap();
        assert_ne!(ci, Matcher::parse("/abc/").unwrap());
        assert_eq!(ci, Matcher::parse("/abc/ii").unwrap());
        assert_eq!(ci.to_string(), "/abc/i");

        let back: Matcher = serde_json::from_value(serde_json::to_value(&ci).unwrap()).unwrap();
        assert!(back.is_match("xABCx"));
        assert_eq!(back, ci);
    }
}
