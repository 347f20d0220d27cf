//! Glob-style pattern matching for resource names and action names.
//!
//! A pattern is either a literal name, a glob containing `*` (anchored at
//! both ends), or the `<no-index>` sentinel. Pattern sets are compiled once
//! at rule-construction time and never mutated afterwards, so they can be
//! shared freely between in-flight requests.

use std::collections::BTreeSet;

/// Sentinel pattern meaning "the request targets no resource at all".
///
/// It participates only in the explicit empty-request check of the indices
/// rule; it never matches a literal resource name.
pub const NO_INDEX: &str = "<no-index>";

/// A single compiled pattern.
///
/// Compilation splits the raw token on runs of `*`; matching walks the
/// resulting segments left to right, so there is no backtracking and every
/// comparison terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<String>,
}

impl Pattern {
    /// Compile a raw pattern token.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = split_on_wildcards(&raw);
        Self { raw, segments }
    }

    /// The raw pattern token as configured.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern carries a `cluster:` remote prefix.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.raw.contains(':')
    }

    /// Match a candidate against this pattern.
    ///
    /// Case-sensitive, anchored glob semantics: `"c*"` matches `"cxxx"` but
    /// not `"xxxcxxx"`. The `<no-index>` sentinel matches nothing here.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        if self.raw == NO_INDEX {
            return false;
        }
        miniglob(&self.segments, candidate)
    }
}

/// Split a raw pattern on runs of `*`, keeping empty leading/trailing
/// segments so that anchoring information survives (`"*c"` → `["", "c"]`).
fn split_on_wildcards(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut prev_star = false;
    for ch in raw.chars() {
        if ch == '*' {
            if !prev_star {
                segments.push(std::mem::take(&mut current));
            }
            prev_star = true;
        } else {
            current.push(ch);
            prev_star = false;
        }
    }
    segments.push(current);
    segments
}

/// Anchored glob match over pre-split segments.
///
/// The first segment must match at the start of the line, the last at the
/// end, and every middle segment must be found left to right in between.
fn miniglob(segments: &[String], line: &str) -> bool {
    if segments.len() == 1 {
        // No wildcard at all: literal equality.
        return line == segments[0];
    }

    let first = &segments[0];
    if !line.starts_with(first.as_str()) {
        return false;
    }

    let mut idx = first.len();
    for segment in &segments[1..segments.len() - 1] {
        match line[idx..].find(segment.as_str()) {
            Some(found) => idx = idx + found + segment.len(),
            None => return false,
        }
    }

    let last = &segments[segments.len() - 1];
    line.len() >= idx + last.len() && line.ends_with(last.as_str())
}

/// An immutable, deduplicated set of compiled patterns.
///
/// Built once when a rule is constructed; insertion order is irrelevant and
/// the set is never mutated afterwards (thread-safe by construction).
#[derive(Debug, Clone)]
pub struct MatcherSet {
    patterns: BTreeSet<String>,
    compiled: Vec<Pattern>,
}

impl MatcherSet {
    /// Build a matcher set from raw pattern tokens. Duplicates collapse.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: BTreeSet<String> = patterns.into_iter().map(Into::into).collect();
        let compiled = patterns.iter().map(Pattern::new).collect();
        Self { patterns, compiled }
    }

    /// The raw configured patterns.
    #[must_use]
    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    /// Whether the exact raw token is present in the set.
    #[must_use]
    pub fn contains(&self, raw: &str) -> bool {
        self.patterns.contains(raw)
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Match a candidate against every pattern in the set.
    #[must_use]
    pub fn match_candidate(&self, candidate: &str) -> bool {
        self.compiled.iter().any(|p| p.matches(candidate))
    }

    /// Remote-cluster-aware match.
    ///
    /// A candidate without a `cluster:` prefix is only compared against
    /// unprefixed patterns; remote-scoped permissions are ignored when the
    /// request did not ask for a remote cluster.
    #[must_use]
    pub fn match_remote_aware(&self, candidate: &str) -> bool {
        let remote_requested = candidate.contains(':');
        self.compiled
            .iter()
            .filter(|p| remote_requested || !p.is_remote())
            .any(|p| p.matches(candidate))
    }

    /// Match with the remote-cluster-awareness of the caller's choosing.
    #[must_use]
    pub fn match_with(&self, remote_cluster_aware: bool, candidate: &str) -> bool {
        if remote_cluster_aware {
            self.match_remote_aware(candidate)
        } else {
            self.match_candidate(candidate)
        }
    }

    /// The subset of candidates matched by at least one pattern.
    #[must_use]
    pub fn filter(&self, candidates: &BTreeSet<String>) -> BTreeSet<String> {
        candidates
            .iter()
            .filter(|c| self.match_candidate(c))
            .cloned()
            .collect()
    }

    /// Remote-cluster-aware [`filter`](Self::filter).
    #[must_use]
    pub fn filter_remote_aware(&self, candidates: &BTreeSet<String>) -> BTreeSet<String> {
        candidates
            .iter()
            .filter(|c| self.match_remote_aware(c))
            .cloned()
            .collect()
    }

    /// Filter with the remote-cluster-awareness of the caller's choosing.
    #[must_use]
    pub fn filter_with(
        &self,
        remote_cluster_aware: bool,
        candidates: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        if remote_cluster_aware {
            self.filter_remote_aware(candidates)
        } else {
            self.filter(candidates)
        }
    }

    /// Reverse match: which configured patterns are matched when each
    /// candidate is itself treated as a single-pattern glob.
    ///
    /// Lets a configured allow-list like `public-*` recognise a caller's own
    /// wildcard request (`pub*`) without enumerating real resource names.
    #[must_use]
    pub fn matching_patterns(&self, candidates: &BTreeSet<String>) -> BTreeSet<String> {
        let mut matched = BTreeSet::new();
        for candidate in candidates {
            let as_glob = Pattern::new(candidate.clone());
            for raw in &self.patterns {
                if as_glob.matches(raw) {
                    matched.insert(raw.clone());
                }
            }
        }
        matched
    }

    /// The configured patterns without a `cluster:` prefix.
    #[must_use]
    pub fn local_patterns(&self) -> BTreeSet<String> {
        self.patterns
            .iter()
            .filter(|p| !p.contains(':'))
            .cloned()
            .collect()
    }
}
