//! Request-scoped evaluation context.
//!
//! A [`RequestContext`] is created per incoming request by the host's
//! transport layer, exclusively owned by the rule chain while it evaluates,
//! and discarded once the response is finalized. Rules communicate through
//! it: narrowing the requested resource sets, attaching response headers,
//! and recording the authenticated identity.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use uuid::Uuid;

use crate::{Error, Result};

/// Response header names set by the rule chain and forwarded to the caller
/// by the host transport layer.
pub mod headers {
    /// Resolved management-UI access level.
    pub const KIBANA_ACCESS: &str = "x-acl-kibana-access";
    /// Comma-joined list of UI applications hidden from the caller.
    pub const KIBANA_HIDDEN_APPS: &str = "x-acl-kibana-hidden-apps";
    /// The group the caller is currently acting under.
    pub const CURRENT_GROUP: &str = "x-acl-current-group";
    /// All groups available to the caller.
    pub const AVAILABLE_GROUPS: &str = "x-acl-available-groups";
    /// The authenticated user name.
    pub const USERNAME: &str = "x-acl-username";
}

/// Credentials extracted from a basic `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The user name.
    pub user: String,
    /// The cleartext password.
    pub password: String,
}

/// The authenticated identity attached to a request by an authentication
/// rule and consumed by later authorization rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedUser {
    id: String,
    current_group: Option<String>,
    available_groups: BTreeSet<String>,
}

impl LoggedUser {
    /// Create an identity for the given user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            current_group: None,
            available_groups: BTreeSet::new(),
        }
    }

    /// The user id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The group the user is currently acting under, if resolved.
    #[must_use]
    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_deref()
    }

    /// Set the current group.
    pub fn set_current_group(&mut self, group: impl Into<String>) {
        self.current_group = Some(group.into());
    }

    /// Record groups as available to this user.
    pub fn add_available_groups(&mut self, groups: impl IntoIterator<Item = String>) {
        self.available_groups.extend(groups);
    }

    /// All groups recorded as available to this user.
    #[must_use]
    pub fn available_groups(&self) -> &BTreeSet<String> {
        &self.available_groups
    }
}

/// Mutable, request-scoped context evaluated by the rule chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: String,
    /// Action name, e.g. `indices:data/read/search`.
    pub action: String,
    /// Request URI path.
    pub uri: String,
    /// Whether this is a read request (writes are all-or-nothing).
    pub is_read_request: bool,
    /// Whether this is a composite request fanning out to multiple
    /// independent sub-targets (e.g. a multi-search).
    pub is_composite: bool,
    /// Whether the action targets indices at all.
    pub involves_indices: bool,
    /// Requested repositories.
    pub repositories: BTreeSet<String>,
    /// Requested snapshots.
    pub snapshots: BTreeSet<String>,
    /// The full universe of existing indices and aliases, supplied by the
    /// host. Empty when no live catalog is available.
    pub all_indices_and_aliases: BTreeSet<String>,
    /// The network origin of the request, when the host could determine it.
    pub origin: Option<IpAddr>,
    indices: BTreeSet<String>,
    request_headers: HashMap<String, String>,
    logged_user: Option<LoggedUser>,
    response_headers: BTreeMap<String, String>,
}

impl RequestContext {
    /// Create a context for the given action with an empty resource set.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            uri: String::from("/"),
            is_read_request: false,
            is_composite: false,
            involves_indices: false,
            repositories: BTreeSet::new(),
            snapshots: BTreeSet::new(),
            all_indices_and_aliases: BTreeSet::new(),
            origin: None,
            indices: BTreeSet::new(),
            request_headers: HashMap::new(),
            logged_user: None,
            response_headers: BTreeMap::new(),
        }
    }

    /// Unique id of this request, for log correlation.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The requested indices, as possibly narrowed by earlier rules.
    #[must_use]
    pub fn indices(&self) -> &BTreeSet<String> {
        &self.indices
    }

    /// Rewrite the requested indices. Rules call this to narrow a request
    /// to the allowed subset.
    pub fn set_indices(&mut self, indices: BTreeSet<String>) {
        self.indices = indices;
    }

    /// Set a request header (lowercased name).
    pub fn set_request_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.request_headers
            .insert(name.into().to_lowercase(), value.into());
    }

    /// Look up a request header by lowercased name.
    #[must_use]
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers.get(name).map(String::as_str)
    }

    /// Basic credentials from the `Authorization` header, if present and
    /// well formed. A malformed header is ambiguous input: it yields `None`
    /// and the rule resolves to NO_MATCH rather than an error.
    #[must_use]
    pub fn basic_auth_credentials(&self) -> Option<Credentials> {
        let value = self.request_header("authorization")?;
        let encoded = value
            .strip_prefix("Basic ")
            .or_else(|| value.strip_prefix("basic "))?;
        let decoded = BASE64.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        if user.is_empty() {
            return None;
        }
        Some(Credentials {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Bearer token from the `Authorization` header, if present.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.request_header("authorization")?;
        value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
    }

    /// The authenticated identity, once an authentication rule has run.
    #[must_use]
    pub fn logged_user(&self) -> Option<&LoggedUser> {
        self.logged_user.as_ref()
    }

    /// Mutable access to the authenticated identity.
    pub fn logged_user_mut(&mut self) -> Option<&mut LoggedUser> {
        self.logged_user.as_mut()
    }

    /// Record the authenticated identity and mirror it into the username
    /// response header.
    pub fn set_logged_user(&mut self, user: LoggedUser) {
        self.set_response_header(headers::USERNAME, user.id().to_string());
        self.logged_user = Some(user);
    }

    /// Attach a response header for the host transport layer to forward.
    pub fn set_response_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_headers.insert(name.into(), value.into());
    }

    /// All response headers attached so far.
    #[must_use]
    pub fn response_headers(&self) -> &BTreeMap<String, String> {
        &self.response_headers
    }

    /// The request origin address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OriginUnresolvable`] when the host could not supply
    /// an origin. Host-based rules cannot be evaluated safely without one,
    /// so this is a hard failure rather than a NO_MATCH.
    pub fn require_origin(&self) -> Result<IpAddr> {
        self.origin.ok_or(Error::OriginUnresolvable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(user: &str, password: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
    }

    #[test]
    fn basic_credentials_decode() {
        let mut ctx = RequestContext::new("indices:data/read/search");
        ctx.set_request_header("Authorization", basic_header("sales", "p4ss:word"));

        let creds = ctx.basic_auth_credentials().unwrap();
        assert_eq!(creds.user, "sales");
        // Only the first colon separates user and password.
        assert_eq!(creds.password, "p4ss:word");
    }

    #[test]
    fn malformed_authorization_header_yields_none() {
        let mut ctx = RequestContext::new("a");
        ctx.set_request_header("authorization", "Basic not-base64!!!");
        assert!(ctx.basic_auth_credentials().is_none());

        ctx.set_request_header("authorization", "Bearer token");
        assert!(ctx.basic_auth_credentials().is_none());
        assert_eq!(ctx.bearer_token(), Some("token"));
    }

    #[test]
    fn empty_user_is_rejected() {
        let mut ctx = RequestContext::new("a");
        ctx.set_request_header("authorization", basic_header("", "pw"));
        assert!(ctx.basic_auth_credentials().is_none());
    }

    #[test]
    fn logged_user_sets_username_header() {
        let mut ctx = RequestContext::new("a");
        ctx.set_logged_user(LoggedUser::new("kibana"));
        assert_eq!(
            ctx.response_headers().get(headers::USERNAME).map(String::as_str),
            Some("kibana")
        );
    }

    #[test]
    fn missing_origin_is_a_hard_error() {
        let ctx = RequestContext::new("a");
        assert!(matches!(
            ctx.require_origin(),
            Err(Error::OriginUnresolvable)
        ));

        let mut ctx = RequestContext::new("a");
        ctx.origin = Some("10.0.0.1".parse().unwrap());
        assert!(ctx.require_origin().is_ok());
    }
}
