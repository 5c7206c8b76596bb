//! Glob patterns over object paths.
//!
//! Matching is delegated to [`glob::Pattern`] with literal separators, so `*`
//! and `?` stay within one path segment and a `**` segment spans
//! directories. Listing starts from the longest literal directory prefix so
//! only the relevant part of a bucket is scanned.

use glob::{MatchOptions, Pattern, PatternError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct Glob {
    source: String,
    prefix: String,
    pattern: Pattern,
}

impl Glob {
    pub fn new(source: &str) -> Result<Self, PatternError> {
        let normalized = source.trim_start_matches("./").trim_start_matches('/');
        let pattern = Pattern::new(normalized)?;

        let segments: Vec<&str> = normalized.split('/').collect();
        let literal: Vec<&str> = segments[..segments.len() - 1]
            .iter()
            .take_while(|s| !is_wild(s))
            .copied()
            .collect();

        Ok(Self {
            source: source.to_string(),
            prefix: literal.join("/"),
            pattern,
        })
    }

    /// Directory to list from, relative to the input root. May be empty.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a root-relative path matches.
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches_with(path, MATCH_OPTIONS)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn is_wild(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}
