//! UI application hiding.
//!
//! Purely cosmetic: always matches, but tells the management UI which
//! applications to hide from the authenticated caller via a response
//! header. Enforcement of what the caller may actually do stays with the
//! other rules.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::acl::{RuleExitResult, SyncRule};
use crate::context::{RequestContext, headers};

/// Configuration for the hidden-apps rule.
#[derive(Debug, Clone, Deserialize)]
pub struct KibanaHideAppsRuleSettings {
    /// UI application ids to hide.
    pub kibana_hide_apps: BTreeSet<String>,
}

/// Rule attaching the hidden-apps header for authenticated callers.
pub struct KibanaHideAppsRule {
    hidden_apps: String,
}

impl KibanaHideAppsRule {
    /// Build the rule from settings.
    #[must_use]
    pub fn from_settings(settings: &KibanaHideAppsRuleSettings) -> Self {
        Self {
            hidden_apps: settings
                .kibana_hide_apps
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl SyncRule for KibanaHideAppsRule {
    fn key(&self) -> &'static str {
        "kibana_hide_apps"
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        if !self.hidden_apps.is_empty() && ctx.logged_user().is_some() {
            ctx.set_response_header(headers::KIBANA_HIDDEN_APPS, self.hidden_apps.clone());
        }
        RuleExitResult::Match
    }
}
