//! Group-membership authorization via an external provider.
//!
//! Runs after an authentication rule has attached a [`LoggedUser`]. Asks
//! the provider for the caller's groups, intersects them with the groups
//! this rule grants, and records the resolved current and available groups
//! on the context and in response headers.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::acl::{AsyncRule, RuleExitResult, RuleKind};
use crate::context::{LoggedUser, RequestContext, headers};
use crate::matcher::MatcherSet;
use crate::{Error, Result};

/// A client resolving the groups a user belongs to.
#[async_trait]
pub trait GroupsProviderClient: Send + Sync {
    /// Fetch the groups of the given user. An empty set is a definitive
    /// "no groups"; `Err` means the provider could not answer.
    async fn fetch_groups(&self, user: &LoggedUser) -> Result<BTreeSet<String>>;
}

#[async_trait]
impl<C> GroupsProviderClient for Arc<C>
where
    C: GroupsProviderClient + ?Sized,
{
    async fn fetch_groups(&self, user: &LoggedUser) -> Result<BTreeSet<String>> {
        (**self).fetch_groups(user).await
    }
}

/// Configuration for the groups-provider authorization rule.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupsProviderRuleSettings {
    /// Groups that grant access.
    pub groups: BTreeSet<String>,
    /// User-name patterns this rule applies to; empty means everyone.
    #[serde(default)]
    pub users: BTreeSet<String>,
}

/// Authorization rule backed by a [`GroupsProviderClient`].
pub struct GroupsProviderAuthorizationRule {
    granted_groups: BTreeSet<String>,
    users: MatcherSet,
    client: Arc<dyn GroupsProviderClient>,
}

impl GroupsProviderAuthorizationRule {
    /// Build the rule from settings and a provider client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no granting group is configured.
    pub fn from_settings(
        settings: &GroupsProviderRuleSettings,
        client: Arc<dyn GroupsProviderClient>,
    ) -> Result<Self> {
        if settings.groups.is_empty() {
            return Err(Error::Config(
                "groups rule requires at least one group".to_string(),
            ));
        }
        let users = if settings.users.is_empty() {
            MatcherSet::new(["*"])
        } else {
            MatcherSet::new(settings.users.iter().cloned())
        };
        Ok(Self {
            granted_groups: settings.groups.clone(),
            users,
            client,
        })
    }
}

#[async_trait]
impl AsyncRule for GroupsProviderAuthorizationRule {
    fn key(&self) -> &'static str {
        "groups_provider_authorization"
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Authorization
    }

    async fn check(&self, ctx: &mut RequestContext) -> Result<RuleExitResult> {
        let Some(user) = ctx.logged_user().cloned() else {
            debug!(request = %ctx.id(), "authorization without authenticated user");
            return Ok(RuleExitResult::NoMatch);
        };

        if !self.users.match_candidate(user.id()) {
            debug!(request = %ctx.id(), user = %user.id(), "user outside this rule's scope");
            return Ok(RuleExitResult::NoMatch);
        }

        let member_of = self.client.fetch_groups(&user).await?;
        let available: BTreeSet<String> = member_of
            .intersection(&self.granted_groups)
            .cloned()
            .collect();
        if available.is_empty() {
            debug!(request = %ctx.id(), user = %user.id(), "no granted group membership");
            return Ok(RuleExitResult::NoMatch);
        }

        // A group preferred by the caller must be one it actually holds.
        let preferred = ctx
            .request_header(headers::CURRENT_GROUP)
            .map(ToString::to_string);
        let current = match preferred {
            Some(group) if available.contains(&group) => group,
            Some(group) => {
                debug!(request = %ctx.id(), group = %group, "preferred group not available");
                return Ok(RuleExitResult::NoMatch);
            }
            // BTreeSet iteration order makes this deterministic.
            None => available
                .iter()
                .next()
                .cloned()
                .unwrap_or_default(),
        };

        if let Some(user) = ctx.logged_user_mut() {
            user.set_current_group(current.clone());
            user.add_available_groups(available.iter().cloned());
        }
        ctx.set_response_header(headers::CURRENT_GROUP, current);
        ctx.set_response_header(
            headers::AVAILABLE_GROUPS,
            available.iter().cloned().collect::<Vec<_>>().join(","),
        );
        Ok(RuleExitResult::Match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticGroups(BTreeSet<String>);

    #[async_trait]
    impl GroupsProviderClient for StaticGroups {
        async fn fetch_groups(&self, _user: &LoggedUser) -> Result<BTreeSet<String>> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl GroupsProviderClient for FailingProvider {
        async fn fetch_groups(&self, _user: &LoggedUser) -> Result<BTreeSet<String>> {
            Err(Error::GroupsProvider("timeout".to_string()))
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn rule(
        groups: &[&str],
        users: &[&str],
        member_of: &[&str],
    ) -> GroupsProviderAuthorizationRule {
        GroupsProviderAuthorizationRule::from_settings(
            &GroupsProviderRuleSettings {
                groups: set(groups),
                users: set(users),
            },
            Arc::new(StaticGroups(set(member_of))),
        )
        .unwrap()
    }

    fn authed_ctx(user: &str) -> RequestContext {
        let mut ctx = RequestContext::new("indices:data/read/search");
        ctx.set_logged_user(LoggedUser::new(user));
        ctx
    }

    #[tokio::test]
    async fn member_of_granted_group_is_authorized() {
        let rule = rule(&["team-a", "team-b"], &[], &["team-b", "unrelated"]);
        let mut ctx = authed_ctx("bob");
        assert!(rule.check(&mut ctx).await.unwrap().is_match());

        let user = ctx.logged_user().unwrap();
        assert_eq!(user.current_group(), Some("team-b"));
        assert_eq!(user.available_groups(), &set(&["team-b"]));
        assert_eq!(
            ctx.response_headers().get(headers::CURRENT_GROUP).map(String::as_str),
            Some("team-b")
        );
    }

    #[tokio::test]
    async fn no_overlap_is_denied() {
        let rule = rule(&["team-a"], &[], &["other"]);
        let mut ctx = authed_ctx("bob");
        assert!(!rule.check(&mut ctx).await.unwrap().is_match());
    }

    #[tokio::test]
    async fn unauthenticated_request_is_denied_without_lookup() {
        let rule = rule(&["team-a"], &[], &["team-a"]);
        let mut ctx = RequestContext::new("indices:data/read/search");
        assert!(!rule.check(&mut ctx).await.unwrap().is_match());
    }

    #[tokio::test]
    async fn user_pattern_scopes_the_rule() {
        let rule = rule(&["team-a"], &["svc-*"], &["team-a"]);

        let mut ctx = authed_ctx("svc-reporting");
        assert!(rule.check(&mut ctx).await.unwrap().is_match());

        let mut ctx = authed_ctx("bob");
        assert!(!rule.check(&mut ctx).await.unwrap().is_match());
    }

    #[tokio::test]
    async fn preferred_group_is_honored_when_held() {
        let rule = rule(&["team-a", "team-b"], &[], &["team-a", "team-b"]);
        let mut ctx = authed_ctx("bob");
        ctx.set_request_header(headers::CURRENT_GROUP, "team-b");
        assert!(rule.check(&mut ctx).await.unwrap().is_match());
        assert_eq!(
            ctx.logged_user().unwrap().current_group(),
            Some("team-b")
        );
    }

    #[tokio::test]
    async fn preferred_group_not_held_is_denied() {
        let rule = rule(&["team-a", "team-b"], &[], &["team-a"]);
        let mut ctx = authed_ctx("bob");
        ctx.set_request_header(headers::CURRENT_GROUP, "team-b");
        assert!(!rule.check(&mut ctx).await.unwrap().is_match());
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_error() {
        let rule = GroupsProviderAuthorizationRule::from_settings(
            &GroupsProviderRuleSettings {
                groups: set(&["team-a"]),
                users: BTreeSet::new(),
            },
            Arc::new(FailingProvider),
        )
        .unwrap();
        let mut ctx = authed_ctx("bob");
        assert!(matches!(
            rule.check(&mut ctx).await,
            Err(Error::GroupsProvider(_))
        ));
    }

    #[tokio::test]
    async fn empty_groups_config_fails_fast() {
        let result = GroupsProviderAuthorizationRule::from_settings(
            &GroupsProviderRuleSettings {
                groups: BTreeSet::new(),
                users: BTreeSet::new(),
            },
            Arc::new(StaticGroups(BTreeSet::new())),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
