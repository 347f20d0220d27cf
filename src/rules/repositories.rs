//! Snapshot-repository access rule.
//!
//! Repository names live in the storage backend, so the engine never sees
//! the full universe; filtering is zero-knowledge. Read requests may be
//! rewritten to the allowed subset; a write touching anything outside the
//! allow-list is denied in full.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::acl::{RuleExitResult, SyncRule};
use crate::context::RequestContext;
use crate::matcher::MatcherSet;
use crate::rules::zero_knowledge::ZeroKnowledgeFilter;
use crate::{Error, Result};

/// Configuration for the repositories rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoriesRuleSettings {
    /// Allowed repository patterns.
    pub repositories: BTreeSet<String>,
}

/// Zero-knowledge repository filter rule.
pub struct RepositoriesRule {
    matcher: MatcherSet,
    zk_filter: ZeroKnowledgeFilter,
}

impl RepositoriesRule {
    /// Build the rule from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no pattern is configured.
    pub fn from_settings(settings: &RepositoriesRuleSettings) -> Result<Self> {
        if settings.repositories.is_empty() {
            return Err(Error::Config(
                "repositories rule requires at least one pattern".to_string(),
            ));
        }
        Ok(Self {
            matcher: MatcherSet::new(settings.repositories.iter().cloned()),
            zk_filter: ZeroKnowledgeFilter::new(false),
        })
    }
}

impl SyncRule for RepositoriesRule {
    fn key(&self) -> &'static str {
        "repositories"
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        if self.matcher.contains("*") {
            return RuleExitResult::Match;
        }

        match self.zk_filter.alter(&ctx.repositories, &self.matcher) {
            None => RuleExitResult::Match,
            Some(modified) if modified.is_empty() => RuleExitResult::NoMatch,
            Some(modified) => {
                if ctx.is_read_request {
                    ctx.repositories = modified;
                    RuleExitResult::Match
                } else {
                    // Rewriting a write would target repositories the
                    // caller did not name.
                    RuleExitResult::NoMatch
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(patterns: &[&str]) -> RepositoriesRule {
        RepositoriesRule::from_settings(&RepositoriesRuleSettings {
            repositories: patterns.iter().map(ToString::to_string).collect(),
        })
        .unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn ctx(requested: &[&str], read: bool) -> RequestContext {
        let mut ctx = RequestContext::new("cluster:admin/repository/get");
        ctx.is_read_request = read;
        ctx.repositories = set(requested);
        ctx
    }

    #[test]
    fn allowed_repository_passes_unchanged() {
        let rule = rule(&["backup-*"]);
        let mut ctx = ctx(&["backup-daily"], true);
        assert!(rule.check(&mut ctx).is_match());
        assert_eq!(ctx.repositories, set(&["backup-daily"]));
    }

    #[test]
    fn star_read_is_rewritten_to_allowed_patterns() {
        let rule = rule(&["backup-*"]);
        let mut ctx = ctx(&["*"], true);
        assert!(rule.check(&mut ctx).is_match());
        assert_eq!(ctx.repositories, set(&["backup-*"]));
    }

    #[test]
    fn forbidden_repository_is_denied() {
        let rule = rule(&["backup-*"]);
        let mut ctx = ctx(&["other-repo"], true);
        assert!(!rule.check(&mut ctx).is_match());
    }

    #[test]
    fn write_needing_rewrite_is_denied() {
        let rule = rule(&["backup-*"]);
        let mut ctx = ctx(&["*"], false);
        assert!(!rule.check(&mut ctx).is_match());
    }

    #[test]
    fn write_to_allowed_repository_matches() {
        let rule = rule(&["backup-*"]);
        let mut ctx = ctx(&["backup-weekly"], false);
        assert!(rule.check(&mut ctx).is_match());
    }

    #[test]
    fn universal_pattern_short_circuits() {
        let rule = rule(&["*"]);
        let mut ctx = ctx(&["anything"], false);
        assert!(rule.check(&mut ctx).is_match());
    }

    #[test]
    fn empty_settings_fail_fast() {
        let result = RepositoriesRule::from_settings(&RepositoriesRuleSettings {
            repositories: BTreeSet::new(),
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
