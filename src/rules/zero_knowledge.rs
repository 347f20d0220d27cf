//! Zero-knowledge resource filtering.
//!
//! Rewrites a requested resource set to the allowed subset using only set
//! algebra over the configured patterns, without enumerating the real
//! resource universe. Used for repositories and snapshots, and as the
//! remote half of cross-cluster index requests where the local catalog
//! says nothing about remote names.

use std::collections::BTreeSet;

use crate::matcher::MatcherSet;

/// Best-effort resource-set rewriter for requests whose real resource
/// universe is unknown.
#[derive(Debug, Clone, Copy)]
pub struct ZeroKnowledgeFilter {
    remote_cluster_aware: bool,
}

impl ZeroKnowledgeFilter {
    /// Create a filter. When `remote_cluster_aware` is set, `cluster:`
    /// prefixed patterns are only considered for candidates that carry a
    /// cluster prefix themselves.
    #[must_use]
    pub fn new(remote_cluster_aware: bool) -> Self {
        Self {
            remote_cluster_aware,
        }
    }

    /// Compute the rewrite for a requested resource set.
    ///
    /// Returns `None` when the request may pass unmodified, `Some(set)`
    /// when the request must be rewritten to target exactly `set`, and
    /// `Some(empty)` when nothing requested is allowed (deny).
    ///
    /// The `*` shortcut deliberately returns the configured patterns
    /// themselves as the new request: the real universe is unknown, so the
    /// allow-list is the best available answer and may still contain `*`
    /// wildcards for the host to expand downstream.
    #[must_use]
    pub fn alter(
        &self,
        requested: &BTreeSet<String>,
        matcher: &MatcherSet,
    ) -> Option<BTreeSet<String>> {
        let mut should_replace = false;
        let mut requested = requested.clone();

        if requested.remove("_all") {
            requested.insert("*".to_string());
        }
        if requested.is_empty() {
            requested.insert("*".to_string());
        }

        if requested.contains("*") {
            if !self.remote_cluster_aware {
                return Some(matcher.patterns().clone());
            }
            if requested.len() == 1 {
                return Some(matcher.local_patterns());
            }
            // `*` requested alongside explicit resources: fold the local
            // allow-patterns in and keep evaluating the explicit ones.
            should_replace = true;
            requested.remove("*");
            requested.extend(matcher.local_patterns());
        }

        let mut output = BTreeSet::new();
        for resource in &requested {
            if matcher.match_with(self.remote_cluster_aware, resource) {
                output.insert(resource.clone());
                continue;
            }

            // Reverse match: the requested token, used as a glob, may cover
            // configured patterns narrower than itself.
            let as_glob = MatcherSet::new([resource.clone()]);
            let covered = as_glob.filter_with(self.remote_cluster_aware, matcher.patterns());
            if !covered.is_empty() {
                output.extend(covered);
                should_replace = true;
            }
            // Otherwise the resource is dropped entirely: denied for that
            // one name.
        }

        if should_replace || output != requested {
            Some(output)
        } else {
            None
        }
    }

    /// Apply [`alter`](Self::alter) through a writer closure.
    ///
    /// Returns `false` when the rewrite denies the request, `true`
    /// otherwise; the closure only runs when a rewrite is necessary.
    pub fn alter_and_check(
        &self,
        requested: &BTreeSet<String>,
        matcher: &MatcherSet,
        write: impl FnOnce(BTreeSet<String>),
    ) -> bool {
        match self.alter(requested, matcher) {
            Some(modified) if modified.is_empty() => false,
            Some(modified) => {
                write(modified);
                true
            }
            None => true,
        }
    }
}
