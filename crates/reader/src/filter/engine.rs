use std::sync::atomic::{AtomicU64, Ordering};
use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),
}

#[derive(Debug, Default)]
pub struct FilterStats {
    pub lines_scanned: AtomicU64,
    pub lines_matched: AtomicU64,
    pub bytes_processed: AtomicU64,
}

/// Decides whether a candidate line is emitted and counted against the cap.
///
/// Patterns are compiled with the ripgrep regex engine, which runs in time
/// linear to the input and never backtracks, so caller-supplied patterns are
/// safe to evaluate. Matching is an unanchored, case-sensitive search.
/// Without a pattern every line matches.
#[derive(Debug)]
pub struct LineFilter {
    matcher: Option<RegexMatcher>,
    stats: FilterStats,
}

impl LineFilter {
    pub fn new(pattern: Option<&str>) -> Result<Self, FilterError> {
        let matcher = match pattern.filter(|p| !p.is_empty()) {
            Some(pattern) => Some(
                RegexMatcherBuilder::new()
                    .case_insensitive(false)
                    .multi_line(false)
                    .build(pattern)
                    .map_err(|e| FilterError::InvalidRegex(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            matcher,
            stats: FilterStats::default(),
        })
    }

    /// A filter that accepts every line.
    pub fn pass_all() -> Self {
        Self {
            matcher: None,
            stats: FilterStats::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.matcher.is_some()
    }

    #[inline]
    pub fn matches(&self, line: &[u8]) -> bool {
        self.stats.lines_scanned.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_processed.fetch_add(line.len() as u64, Ordering::Relaxed);

        let matched = match &self.matcher {
            // A matcher error cannot happen for in-memory byte slices; treat it as a miss.
            Some(matcher) => matcher.is_match(line).unwrap_or(false),
            None => true,
        };

        if matched {
            self.stats.lines_matched.fetch_add(1, Ordering::Relaxed);
        }

        matched
    }

    /// (lines scanned, lines matched, bytes processed)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.lines_scanned.load(Ordering::Relaxed),
            self.stats.lines_matched.load(Ordering::Relaxed),
            self.stats.bytes_processed.load(Ordering::Relaxed),
        )
    }
}

impl Default for LineFilter {
    fn default() -> Self {
        Self::pass_all()
    }
}
