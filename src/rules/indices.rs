//! The indices decision engine.
//!
//! Unlike the zero-knowledge filter, this rule has access to the real
//! universe of indices and aliases, so it can expand wildcards and make
//! stronger decisions. Read requests may be silently narrowed to the
//! allowed subset; write requests are all-or-nothing, because silently
//! redirecting a write would store data somewhere the caller did not
//! intend.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::debug;

use crate::acl::{RuleExitResult, SyncRule};
use crate::context::RequestContext;
use crate::matcher::{MatcherSet, NO_INDEX};
use crate::rules::zero_knowledge::ZeroKnowledgeFilter;
use crate::{Error, Result};

/// Read actions that may fan out across clusters and therefore mix
/// `cluster:`-prefixed and local index names in one request.
const CROSS_CLUSTER_SEARCH_ACTIONS: &[&str] =
    &["indices:data/read/search", "indices:data/read/msearch"];

/// Configuration for the indices rule.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicesRuleSettings {
    /// Allowed index patterns.
    pub indices: BTreeSet<String>,
}

/// Multi-stage indices access rule.
pub struct IndicesRule {
    matcher: MatcherSet,
    zk_filter: ZeroKnowledgeFilter,
}

impl IndicesRule {
    /// Build the rule from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no pattern is configured.
    pub fn from_settings(settings: &IndicesRuleSettings) -> Result<Self> {
        if settings.indices.is_empty() {
            return Err(Error::Config(
                "indices rule requires at least one pattern".to_string(),
            ));
        }
        Ok(Self {
            matcher: MatcherSet::new(settings.indices.iter().cloned()),
            zk_filter: ZeroKnowledgeFilter::new(true),
        })
    }

    /// Whether this request mixes remote and local targets and needs the
    /// scatter-gather path.
    fn is_cross_cluster_read(&self, ctx: &RequestContext) -> bool {
        ctx.is_read_request
            && CROSS_CLUSTER_SEARCH_ACTIONS.contains(&ctx.action.as_str())
            && ctx.indices().iter().any(|i| i.contains(':'))
    }

    /// Cross-cluster fork: run the staged local algorithm on local names
    /// and the zero-knowledge filter on remote names, then merge.
    fn check_cross_cluster(&self, ctx: &mut RequestContext) -> RuleExitResult {
        let (remote, local): (BTreeSet<String>, BTreeSet<String>) = ctx
            .indices()
            .iter()
            .cloned()
            .partition(|i| i.contains(':'));

        let mut merged = local.clone();
        if !local.is_empty() {
            // A purely remote request must not run the local algorithm:
            // an empty local set would be read as "all local indices".
            ctx.set_indices(local);
            if !self.can_pass(ctx) {
                return RuleExitResult::NoMatch;
            }
            merged = ctx.indices().clone();
        }

        match self.zk_filter.alter(&remote, &self.matcher) {
            Some(modified) if modified.is_empty() => return RuleExitResult::NoMatch,
            Some(modified) => merged.extend(modified),
            None => merged.extend(remote),
        }

        ctx.set_indices(merged);
        RuleExitResult::Match
    }

    /// The staged decision procedure over the live index catalog.
    fn can_pass(&self, ctx: &mut RequestContext) -> bool {
        let mut indices = ctx.indices().clone();

        // Requesting none or all of the indices means requesting whatever
        // allowed indices exist.
        debug!(request = %ctx.id(), "indices stage 0");
        if indices.is_empty() || indices.contains("_all") || indices.contains("*") {
            let allowed = self.matcher.filter(&ctx.all_indices_and_aliases);
            if !allowed.is_empty() {
                ctx.set_indices(allowed);
                return true;
            }
            // Nothing allowed exists. A write that targets no index at all
            // may still pass when the sentinel is configured.
            return !ctx.is_read_request && indices.is_empty() && self.matcher.contains(NO_INDEX);
        }

        if ctx.is_read_request {
            // Single requested index matching directly.
            debug!(request = %ctx.id(), "indices stage 1");
            if indices.len() == 1 {
                if let Some(index) = indices.iter().next() {
                    if self.matcher.match_candidate(index) {
                        return true;
                    }
                }
            }

            // Every requested index matches directly.
            debug!(request = %ctx.id(), "indices stage 2");
            if self.matcher.filter(&indices).len() == indices.len() {
                return true;
            }

            // Requested literals that do not exist: the host will answer
            // not-found on its own, which reveals nothing.
            debug!(request = %ctx.id(), "indices stage 2.1");
            let real = &ctx.all_indices_and_aliases;
            let non_existent: BTreeSet<String> = indices
                .iter()
                .filter(|i| !i.contains('*') && !real.contains(*i))
                .cloned()
                .collect();

            if !non_existent.is_empty() {
                if !ctx.is_composite {
                    return true;
                }
                // Composite requests keep evaluating without the
                // non-existent sub-targets.
                indices.retain(|i| !non_existent.contains(i));
                if indices.is_empty() {
                    // Natural empty result set, safe to let through.
                    return true;
                }
            }

            // Expand the surviving request against the real catalog.
            debug!(request = %ctx.id(), "indices stage 3");
            let expansion = MatcherSet::new(indices.iter().cloned())
                .filter(&ctx.all_indices_and_aliases);

            debug!(request = %ctx.id(), "indices stage 4");
            if expansion.is_empty() {
                // Expands to nothing real: natural not-found.
                return true;
            }

            let allowed_expansion = self.matcher.filter(&expansion);

            debug!(request = %ctx.id(), "indices stage 5");
            if allowed_expansion.is_empty() {
                // Something was requested, none of it is allowed.
                return false;
            }

            // Narrow the request to the allowed, existing subset.
            debug!(request = %ctx.id(), "indices stage 6");
            ctx.set_indices(allowed_expansion);
            true
        } else {
            // A write is denied in full if even one target is unauthorized.
            debug!(request = %ctx.id(), "indices write stage");
            indices.iter().all(|i| self.matcher.match_candidate(i))
        }
    }
}

impl SyncRule for IndicesRule {
    fn key(&self) -> &'static str {
        "indices"
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        if !ctx.involves_indices || self.matcher.contains("*") {
            return RuleExitResult::Match;
        }

        if self.is_cross_cluster_read(ctx) {
            return self.check_cross_cluster(ctx);
        }

        self.can_pass(ctx).into()
    }
}
