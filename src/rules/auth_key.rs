//! Static credential authentication.
//!
//! Two variants: the configured key held in cleartext, or as a SHA-256
//! digest so the cleartext never appears in configuration files. Both
//! compare in constant time and record the authenticated identity on
//! success.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::acl::{RuleExitResult, RuleKind, SyncRule};
use crate::context::{Credentials, LoggedUser, RequestContext};
use crate::{Error, Result};

fn validate_key(key: &str, rule: &str) -> Result<()> {
    match key.split_once(':') {
        Some((user, _)) if !user.is_empty() => Ok(()),
        _ => Err(Error::Config(format!(
            "{rule} must be configured as user:secret"
        ))),
    }
}

/// Constant-time equality over byte strings of any length. Length still
/// leaks, the contents do not.
fn ct_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn authenticate(
    ctx: &mut RequestContext,
    rule_key: &str,
    verify: impl FnOnce(&Credentials) -> bool,
) -> RuleExitResult {
    let Some(credentials) = ctx.basic_auth_credentials() else {
        debug!(request = %ctx.id(), rule = rule_key, "no basic credentials supplied");
        return RuleExitResult::NoMatch;
    };
    if verify(&credentials) {
        ctx.set_logged_user(LoggedUser::new(credentials.user));
        RuleExitResult::Match
    } else {
        debug!(request = %ctx.id(), rule = rule_key, user = %credentials.user, "credentials rejected");
        RuleExitResult::NoMatch
    }
}

/// Configuration for the cleartext auth-key rule.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthKeyRuleSettings {
    /// Expected credentials, as `user:secret`.
    pub auth_key: String,
}

/// Authenticates against a cleartext `user:secret` key.
pub struct AuthKeyRule {
    auth_key: String,
}

impl AuthKeyRule {
    /// Build the rule from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the key is not `user:secret` shaped.
    pub fn from_settings(settings: &AuthKeyRuleSettings) -> Result<Self> {
        validate_key(&settings.auth_key, "auth_key")?;
        Ok(Self {
            auth_key: settings.auth_key.clone(),
        })
    }
}

impl SyncRule for AuthKeyRule {
    fn key(&self) -> &'static str {
        "auth_key"
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Authentication
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        authenticate(ctx, self.key(), |credentials| {
            let provided = format!("{}:{}", credentials.user, credentials.password);
            ct_str_eq(&provided, &self.auth_key)
        })
    }
}

/// Configuration for the hashed auth-key rule.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthKeySha256RuleSettings {
    /// Lowercase hex SHA-256 of `user:secret`.
    pub auth_key_sha256: String,
}

/// Authenticates against a SHA-256 digest of `user:secret`.
pub struct AuthKeySha256Rule {
    digest_hex: String,
}

impl AuthKeySha256Rule {
    /// Build the rule from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the digest is not 64 hex characters.
    pub fn from_settings(settings: &AuthKeySha256RuleSettings) -> Result<Self> {
        let digest = settings.auth_key_sha256.to_lowercase();
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Config(
                "auth_key_sha256 must be a 64-character hex digest".to_string(),
            ));
        }
        Ok(Self { digest_hex: digest })
    }
}

impl SyncRule for AuthKeySha256Rule {
    fn key(&self) -> &'static str {
        "auth_key_sha256"
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Authentication
    }

    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        authenticate(ctx, self.key(), |credentials| {
            let provided = format!("{}:{}", credentials.user, credentials.password);
            let digest = hex::encode(Sha256::digest(provided.as_bytes()));
            ct_str_eq(&digest, &self.digest_hex)
        })
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use super::*;

    fn ctx_with_basic(user: &str, password: &str) -> RequestContext {
        let mut ctx = RequestContext::new("indices:data/read/search");
        let encoded = BASE64.encode(format!("{user}:{password}"));
        ctx.set_request_header("authorization", format!("Basic {encoded}"));
        ctx
    }

    // ── Cleartext key ─────────────────────────────────────────────────

    #[test]
    fn correct_credentials_match_and_set_user() {
        let rule = AuthKeyRule::from_settings(&AuthKeyRuleSettings {
            auth_key: "sales:p4ssw0rd".to_string(),
        })
        .unwrap();

        let mut ctx = ctx_with_basic("sales", "p4ssw0rd");
        assert!(rule.check(&mut ctx).is_match());
        assert_eq!(ctx.logged_user().map(LoggedUser::id), Some("sales"));
    }

    #[test]
    fn wrong_password_does_not_match() {
        let rule = AuthKeyRule::from_settings(&AuthKeyRuleSettings {
            auth_key: "sales:p4ssw0rd".to_string(),
        })
        .unwrap();

        let mut ctx = ctx_with_basic("sales", "nope");
        assert!(!rule.check(&mut ctx).is_match());
        assert!(ctx.logged_user().is_none());
    }

    #[test]
    fn missing_credentials_do_not_match() {
        let rule = AuthKeyRule::from_settings(&AuthKeyRuleSettings {
            auth_key: "sales:p4ssw0rd".to_string(),
        })
        .unwrap();

        let mut ctx = RequestContext::new("indices:data/read/search");
        assert!(!rule.check(&mut ctx).is_match());
    }

    #[test]
    fn key_without_user_fails_fast() {
        for key in ["no-colon", ":password"] {
            let result = AuthKeyRule::from_settings(&AuthKeyRuleSettings {
                auth_key: key.to_string(),
            });
            assert!(matches!(result, Err(Error::Config(_))), "{key}");
        }
    }

    // ── Hashed key ────────────────────────────────────────────────────

    #[test]
    fn sha256_key_matches_digest_of_user_and_password() {
        let digest = hex::encode(Sha256::digest(b"admin:container"));
        let rule = AuthKeySha256Rule::from_settings(&AuthKeySha256RuleSettings {
            auth_key_sha256: digest,
        })
        .unwrap();

        let mut ctx = ctx_with_basic("admin", "container");
        assert!(rule.check(&mut ctx).is_match());
        assert_eq!(ctx.logged_user().map(LoggedUser::id), Some("admin"));

        let mut ctx = ctx_with_basic("admin", "wrong");
        assert!(!rule.check(&mut ctx).is_match());
    }

    #[test]
    fn digest_comparison_is_case_insensitive_on_config_side() {
        let digest = hex::encode(Sha256::digest(b"admin:container")).to_uppercase();
        let rule = AuthKeySha256Rule::from_settings(&AuthKeySha256RuleSettings {
            auth_key_sha256: digest,
        })
        .unwrap();

        let mut ctx = ctx_with_basic("admin", "container");
        assert!(rule.check(&mut ctx).is_match());
    }

    #[test]
    fn malformed_digest_fails_fast() {
        let result = AuthKeySha256Rule::from_settings(&AuthKeySha256RuleSettings {
            auth_key_sha256: "abc123".to_string(),
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
