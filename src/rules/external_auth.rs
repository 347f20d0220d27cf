//! Authentication against an external service.
//!
//! The rule owns no transport. The host supplies an
//! [`AuthenticationServiceClient`]; this module only defines when the
//! client is asked and what a positive answer means for the request.
//! Wrap the client in [`CachedAuthenticationClient`] to bound lookup
//! traffic.
//!
//! [`CachedAuthenticationClient`]: crate::cache::CachedAuthenticationClient

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::acl::{AsyncRule, RuleExitResult, RuleKind};
use crate::context::{Credentials, LoggedUser, RequestContext};
use crate::Result;

/// A client able to verify basic credentials against some external system.
#[async_trait]
pub trait AuthenticationServiceClient: Send + Sync {
    /// Verify the credentials. `Ok(false)` means a definitive rejection;
    /// `Err` means the service could not answer.
    async fn authenticate(&self, credentials: &Credentials) -> Result<bool>;
}

#[async_trait]
impl<C> AuthenticationServiceClient for Arc<C>
where
    C: AuthenticationServiceClient + ?Sized,
{
    async fn authenticate(&self, credentials: &Credentials) -> Result<bool> {
        (**self).authenticate(credentials).await
    }
}

/// Rule delegating authentication to an external service.
pub struct ExternalAuthenticationRule {
    client: Arc<dyn AuthenticationServiceClient>,
}

impl ExternalAuthenticationRule {
    /// Build the rule around a service client.
    pub fn new(client: Arc<dyn AuthenticationServiceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AsyncRule for ExternalAuthenticationRule {
    fn key(&self) -> &'static str {
        "external_authentication"
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Authentication
    }

    async fn check(&self, ctx: &mut RequestContext) -> Result<RuleExitResult> {
        let Some(credentials) = ctx.basic_auth_credentials() else {
            debug!(request = %ctx.id(), "no basic credentials for external authentication");
            return Ok(RuleExitResult::NoMatch);
        };
        if self.client.authenticate(&credentials).await? {
            ctx.set_logged_user(LoggedUser::new(credentials.user));
            Ok(RuleExitResult::Match)
        } else {
            debug!(request = %ctx.id(), user = %credentials.user, "external service rejected credentials");
            Ok(RuleExitResult::NoMatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use crate::Error;

    use super::*;

    struct FixedAnswer {
        answer: Result<bool>,
        calls: AtomicUsize,
    }

    impl FixedAnswer {
        fn ok(answer: bool) -> Self {
            Self {
                answer: Ok(answer),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(Error::AuthenticationService("connection refused".into())),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthenticationServiceClient for FixedAnswer {
        async fn authenticate(&self, _credentials: &Credentials) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Ok(answer) => Ok(*answer),
                Err(_) => Err(Error::AuthenticationService("connection refused".into())),
            }
        }
    }

    fn ctx_with_basic(user: &str, password: &str) -> RequestContext {
        let mut ctx = RequestContext::new("indices:data/read/search");
        let encoded = BASE64.encode(format!("{user}:{password}"));
        ctx.set_request_header("authorization", format!("Basic {encoded}"));
        ctx
    }

    #[tokio::test]
    async fn accepted_credentials_match_and_set_user() {
        let rule = ExternalAuthenticationRule::new(Arc::new(FixedAnswer::ok(true)));
        let mut ctx = ctx_with_basic("ldap-user", "secret");
        assert!(rule.check(&mut ctx).await.unwrap().is_match());
        assert_eq!(ctx.logged_user().map(LoggedUser::id), Some("ldap-user"));
    }

    #[tokio::test]
    async fn rejected_credentials_do_not_match() {
        let rule = ExternalAuthenticationRule::new(Arc::new(FixedAnswer::ok(false)));
        let mut ctx = ctx_with_basic("ldap-user", "secret");
        assert!(!rule.check(&mut ctx).await.unwrap().is_match());
        assert!(ctx.logged_user().is_none());
    }

    #[tokio::test]
    async fn missing_credentials_skip_the_service() {
        let client = Arc::new(FixedAnswer::ok(true));
        let rule = ExternalAuthenticationRule::new(client.clone());
        let mut ctx = RequestContext::new("indices:data/read/search");
        assert!(!rule.check(&mut ctx).await.unwrap().is_match());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn service_failure_surfaces_as_error() {
        let rule = ExternalAuthenticationRule::new(Arc::new(FixedAnswer::failing()));
        let mut ctx = ctx_with_basic("ldap-user", "secret");
        assert!(matches!(
            rule.check(&mut ctx).await,
            Err(Error::AuthenticationService(_))
        ));
    }
}
