//! Bearer-token (JWT) authentication.
//!
//! Verifies an HS256-signed token from the `Authorization: Bearer` header,
//! extracts the user id from a configurable claim and optionally requires
//! one of a set of roles. Verification is pure CPU work, so this is a
//! synchronous rule. An invalid token is a caller problem, not an engine
//! failure: it resolves to NO_MATCH, never an error.

use std::collections::{BTreeSet, HashSet};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::acl::{RuleExitResult, RuleKind, SyncRule};
use crate::context::{LoggedUser, RequestContext};
use crate::{Error, Result};

/// Configuration for the JWT authentication rule.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthRuleSettings {
    /// HMAC secret the token signature is verified against.
    pub signature_key: String,
    /// Claim holding the user id.
    #[serde(default = "default_user_claim")]
    pub user_claim: String,
    /// Claim holding the caller's roles, checked against `roles` when set.
    #[serde(default)]
    pub roles_claim: Option<String>,
    /// Roles of which the token must carry at least one.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

fn default_user_claim() -> String {
    "sub".to_string()
}

/// Rule authenticating callers by verified JWT.
pub struct JwtAuthRule {
    decoding_key: DecodingKey,
    validation: Validation,
    user_claim: String,
    roles_claim: Option<String>,
    roles: BTreeSet<String>,
}

impl JwtAuthRule {
    /// Build the rule from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the signature key is empty or roles
    /// are configured without a roles claim.
    pub fn from_settings(settings: &JwtAuthRuleSettings) -> Result<Self> {
        if settings.signature_key.is_empty() {
            return Err(Error::Config(
                "jwt_auth signature_key must not be empty".to_string(),
            ));
        }
        if !settings.roles.is_empty() && settings.roles_claim.is_none() {
            return Err(Error::Config(
                "jwt_auth roles require a roles_claim".to_string(),
            ));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        // Tokens without an expiry are accepted; an expiry that is present
        // is still enforced.
        validation.required_spec_claims = HashSet::new();
        Ok(Self {
            decoding_key: DecodingKey::from_secret(settings.signature_key.as_bytes()),
            validation,
            user_claim: settings.user_claim.clone(),
            roles_claim: settings.roles_claim.clone(),
            roles: settings.roles.clone(),
        })
    }

    fn claim_roles(&self, claims: &Value) -> BTreeSet<String> {
        let Some(claim) = &self.roles_claim else {
            return BTreeSet::new();
        };
        match claims.get(claim) {
            Some(Value::String(role)) => std::iter::once(role.clone()).collect(),
            Some(Value::Array(roles)) => roles
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect(),
            _ => BTreeSet::new(),
        }
    }
}

impl SyncRule for JwtAuthRule {
    fn key(&self) -> &'static str {
        "jwt_auth"
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Authentication
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        let Some(token) = ctx.bearer_token() else {
            debug!(request = %ctx.id(), "no bearer token");
            return RuleExitResult::NoMatch;
        };

        let claims = match decode::<Value>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(request = %ctx.id(), error = %err, "token verification failed");
                return RuleExitResult::NoMatch;
            }
        };

        let Some(user) = claims.get(&self.user_claim).and_then(Value::as_str) else {
            debug!(request = %ctx.id(), claim = %self.user_claim, "user claim missing");
            return RuleExitResult::NoMatch;
        };

        if !self.roles.is_empty() {
            let held = self.claim_roles(&claims);
            if held.intersection(&self.roles).next().is_none() {
                debug!(request = %ctx.id(), user = %user, "token carries none of the required roles");
                return RuleExitResult::NoMatch;
            }
        }

        ctx.set_logged_user(LoggedUser::new(user));
        RuleExitResult::Match
    }
}
