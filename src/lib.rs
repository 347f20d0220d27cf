//! In-line access control for a multi-tenant search cluster.
//!
//! Evaluates every request against an ordered list of rule blocks before
//! it reaches the cluster, and either forbids it or lets it through with
//! the requested resource set narrowed to what the caller may see.
//!
//! # Features
//!
//! - **Wildcard matching**: compiled glob patterns over index, repository
//!   and snapshot names, remote-cluster aware
//! - **Zero-knowledge filtering**: rewrites requests to the allowed subset
//!   without enumerating the real resource universe
//! - **Staged index decisions**: catalog-backed narrowing for reads,
//!   all-or-nothing for writes
//! - **Management-UI policy**: graded Kibana access levels with a strict
//!   read-only mode
//! - **Async rule chain**: sequential evaluation with fail-closed error
//!   handling, plus TTL caching for external lookups
//!
//! The engine owns no transport: the host hands in a [`RequestContext`]
//! per request and applies the verdict.
//!
//! [`RequestContext`]: context::RequestContext

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod cache;
pub mod context;
pub mod error;
pub mod matcher;
pub mod rules;

pub use acl::{Acl, AclDecision, Block, BlockPolicy, Rule, RuleExitResult, RuleKind};
pub use context::{Credentials, LoggedUser, RequestContext};
pub use error::{Error, Result};
pub use matcher::MatcherSet;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
