//! Snapshot access rule.
//!
//! Same zero-knowledge algebra as the repositories rule, applied to the
//! snapshot names of the request.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::acl::{RuleExitResult, SyncRule};
use crate::context::RequestContext;
use crate::matcher::MatcherSet;
use crate::rules::zero_knowledge::ZeroKnowledgeFilter;
use crate::{Error, Result};

/// Configuration for the snapshots rule.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotsRuleSettings {
    /// Allowed snapshot patterns.
    pub snapshots: BTreeSet<String>,
}

/// Zero-knowledge snapshot filter rule.
pub struct SnapshotsRule {
    matcher: MatcherSet,
    zk_filter: ZeroKnowledgeFilter,
}

impl SnapshotsRule {
    /// Build the rule from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no pattern is configured.
    pub fn from_settings(settings: &SnapshotsRuleSettings) -> Result<Self> {
        if settings.snapshots.is_empty() {
            return Err(Error::Config(
                "snapshots rule requires at least one pattern".to_string(),
            ));
        }
        Ok(Self {
            matcher: MatcherSet::new(settings.snapshots.iter().cloned()),
            zk_filter: ZeroKnowledgeFilter::new(false),
        })
    }
}

impl SyncRule for SnapshotsRule {
    fn key(&self) -> &'static str {
        "snapshots"
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        if self.matcher.contains("*") {
            return RuleExitResult::Match;
        }

        match self.zk_filter.alter(&ctx.snapshots, &self.matcher) {
            None => RuleExitResult::Match,
            Some(modified) if modified.is_empty() => RuleExitResult::NoMatch,
            Some(modified) => {
                if ctx.is_read_request {
                    ctx.snapshots = modified;
                    RuleExitResult::Match
                } else {
                    RuleExitResult::NoMatch
                }
            }
        }
    }
}
