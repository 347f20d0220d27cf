//! Management-UI (Kibana) access policy.
//!
//! A small state machine mapping an access level to the operations allowed
//! against the caller's management index. The operation-pattern sets are
//! immutable process-wide constants built once at first use and shared by
//! reference; they are never mutated afterwards.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::acl::{RuleExitResult, SyncRule};
use crate::context::{RequestContext, headers};
use crate::matcher::MatcherSet;
use crate::{Error, Result};

/// Index targeted by UI writers that must always pass, for any level.
pub const DEVNULL_KIBANA_INDEX: &str = ".kibana-devnull";

/// Reserved index backing this engine's own administrative state.
pub const SELF_INDEX: &str = ".searchgate";

/// Default management index when none is configured or resolvable.
const DEFAULT_KIBANA_INDEX: &str = ".kibana";

/// Placeholder in a templated management-index name, replaced with the
/// caller's own user id.
const USER_VARIABLE: &str = "@{user}";

/// Read operations, allowed for every access level.
pub static RO_OPS: LazyLock<MatcherSet> = LazyLock::new(|| {
    MatcherSet::new([
        "indices:admin/exists",
        "indices:admin/mappings/fields/get*",
        "indices:admin/mappings/get*",
        "indices:admin/validate/query",
        "indices:admin/get",
        "indices:admin/refresh*",
        "indices:admin/aliases/get",
        "indices:data/read/*",
        "indices:monitor/stats",
    ])
});

/// Write operations against the management index, allowed from
/// [`KibanaAccess::ReadWrite`] upwards.
pub static RW_OPS: LazyLock<MatcherSet> = LazyLock::new(|| {
    MatcherSet::new([
        "indices:admin/create",
        "indices:admin/mapping/put",
        "indices:admin/template/*",
        "indices:data/write/delete*",
        "indices:data/write/index",
        "indices:data/write/update*",
        "indices:data/write/bulk*",
    ])
});

/// Administrative operations reserved for [`KibanaAccess::Admin`].
pub static ADMIN_OPS: LazyLock<MatcherSet> = LazyLock::new(|| {
    MatcherSet::new([
        "cluster:admin/acl/*",
        "indices:data/write/*",
        "indices:admin/create",
    ])
});

/// Cluster-health checks, allowed for every access level.
pub static CLUSTER_OPS: LazyLock<MatcherSet> = LazyLock::new(|| {
    MatcherSet::new([
        "cluster:monitor/nodes/info",
        "cluster:monitor/main",
        "cluster:monitor/health",
        "cluster:monitor/state",
    ])
});

/// Access level granted to the caller for the management UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KibanaAccess {
    /// Read operations only, no exceptions.
    ReadOnlyStrict,
    /// Read operations plus a narrow carve-out for UI state documents.
    ReadOnly,
    /// Read and write operations against the management index.
    ReadWrite,
    /// Read/write plus administrative cluster actions.
    Admin,
}

impl KibanaAccess {
    /// Header value reported back to the UI.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnlyStrict => "ro_strict",
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
            Self::Admin => "admin",
        }
    }

    /// Whether this level may modify the management index.
    #[must_use]
    fn can_modify(self) -> bool {
        matches!(self, Self::ReadWrite | Self::Admin)
    }
}

/// Configuration for the Kibana access rule.
#[derive(Debug, Clone, Deserialize)]
pub struct KibanaAccessRuleSettings {
    /// Granted access level.
    pub kibana_access: KibanaAccess,
    /// Management index name, optionally templated with `@{user}`.
    #[serde(default)]
    pub kibana_index: Option<String>,
}

/// The Kibana access policy rule.
pub struct KibanaAccessRule {
    access: KibanaAccess,
    kibana_index_template: String,
}

impl KibanaAccessRule {
    /// Build the rule from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configured index name is empty.
    pub fn from_settings(settings: &KibanaAccessRuleSettings) -> Result<Self> {
        let template = settings
            .kibana_index
            .clone()
            .unwrap_or_else(|| DEFAULT_KIBANA_INDEX.to_string());
        if template.is_empty() {
            return Err(Error::Config(
                "kibana_index must not be empty".to_string(),
            ));
        }
        Ok(Self {
            access: settings.kibana_access,
            kibana_index_template: template,
        })
    }

    /// Resolve the caller's management index, substituting the user id
    /// into a templated name. An unresolvable template falls back to the
    /// default index rather than failing the request.
    fn resolve_kibana_index(&self, ctx: &RequestContext) -> String {
        if !self.kibana_index_template.contains(USER_VARIABLE) {
            return self.kibana_index_template.clone();
        }
        match ctx.logged_user() {
            Some(user) => self.kibana_index_template.replace(USER_VARIABLE, user.id()),
            None => DEFAULT_KIBANA_INDEX.to_string(),
        }
    }

    /// URIs a non-strict read-only caller may still write: saved UI state
    /// in discover, short urls and index-pattern documents. A narrow
    /// carve-out, not a general write allowance.
    fn non_strict_allowed_paths(kibana_index: &str) -> Option<Regex> {
        let pattern = format!(
            "^/{}/(url|config/.*/_create|index-pattern)/.*",
            regex::escape(kibana_index)
        );
        Regex::new(&pattern).ok()
    }

    fn decide(&self, ctx: &RequestContext) -> RuleExitResult {
        let indices: BTreeSet<String> = if ctx.involves_indices {
            ctx.indices().clone()
        } else {
            BTreeSet::new()
        };

        // UI writers drain into the devnull index for every level.
        if indices.contains(DEVNULL_KIBANA_INDEX) {
            return RuleExitResult::Match;
        }

        // Read and cluster-health operations pass for every level.
        if RO_OPS.match_candidate(&ctx.action) || CLUSTER_OPS.match_candidate(&ctx.action) {
            return RuleExitResult::Match;
        }

        let kibana_index = self.resolve_kibana_index(ctx);
        let targets_kibana = indices.len() == 1 && indices.contains(&kibana_index);

        if targets_kibana
            && self.access == KibanaAccess::ReadOnly
            && ctx.action.starts_with("indices:data/write/")
            && Self::non_strict_allowed_paths(&kibana_index)
                .is_some_and(|re| re.is_match(&ctx.uri))
        {
            return RuleExitResult::Match;
        }

        if targets_kibana && self.access.can_modify() {
            if RW_OPS.match_candidate(&ctx.action) || ctx.action.starts_with("indices:data/write") {
                debug!(request = %ctx.id(), "RW access to management index");
                return RuleExitResult::Match;
            }
            info!(
                request = %ctx.id(),
                action = %ctx.action,
                "RW access to management index, but unrecognized action"
            );
            return RuleExitResult::NoMatch;
        }

        if self.access == KibanaAccess::Admin
            && (indices.contains(SELF_INDEX) || indices.is_empty())
            && ADMIN_OPS.match_candidate(&ctx.action)
        {
            return RuleExitResult::Match;
        }

        debug!(request = %ctx.id(), action = %ctx.action, "management-UI access denied");
        RuleExitResult::NoMatch
    }
}

impl SyncRule for KibanaAccessRule {
    fn key(&self) -> &'static str {
        "kibana_access"
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        let result = self.decide(ctx);
        if result.is_match() {
            ctx.set_response_header(headers::KIBANA_ACCESS, self.access.as_str());
        }
        result
    }
}
