//! Ordered rule blocks and the ACL front door.
//!
//! A block is an ordered rule list with AND semantics: rules run strictly
//! left to right, the first NO_MATCH short-circuits, and an async rule's
//! lookup only starts after the previous rule resolved to MATCH. Identity
//! must be set by an authentication rule before a later authorization rule
//! reads it, so nothing runs speculatively in parallel.
//!
//! The ACL evaluates blocks in declaration order; the first block whose
//! rules all match decides the verdict through its policy. No matching
//! block means the request is forbidden (fail-closed).

pub mod rule;

use serde::Deserialize;
use tracing::{debug, warn};

pub use rule::{AsyncRule, Rule, RuleExitResult, RuleKind, SyncRule};

use crate::context::RequestContext;
use crate::{Error, Result};

/// What a matching block decides for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPolicy {
    /// The request is permitted (possibly with a narrowed resource set).
    Allow,
    /// The request is explicitly denied.
    Forbid,
}

/// An ordered list of rules evaluated with AND semantics.
pub struct Block {
    name: String,
    policy: BlockPolicy,
    rules: Vec<Rule>,
}

impl Block {
    /// Build a block, failing fast on inconsistent rule composition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the block contains an authorization
    /// rule but no authentication rule: the authorization check would never
    /// see an identity, so the block is meaningless as configured.
    pub fn new(name: impl Into<String>, policy: BlockPolicy, rules: Vec<Rule>) -> Result<Self> {
        let name = name.into();
        let has_authentication = rules.iter().any(|r| r.kind() == RuleKind::Authentication);
        let has_authorization = rules.iter().any(|r| r.kind() == RuleKind::Authorization);
        if has_authorization && !has_authentication {
            return Err(Error::Config(format!(
                "block '{name}' contains an authorization rule but no authentication rule"
            )));
        }
        Ok(Self {
            name,
            policy,
            rules,
        })
    }

    /// The block's configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The verdict this block produces when it matches.
    #[must_use]
    pub fn policy(&self) -> BlockPolicy {
        self.policy
    }

    /// Evaluate every rule in order against the context.
    ///
    /// This is the single point where evaluation errors are converted:
    /// any failed async lookup is logged and treated as NO_MATCH, never
    /// surfaced to the caller or left unresolved.
    pub async fn check(&self, ctx: &mut RequestContext) -> RuleExitResult {
        for rule in &self.rules {
            let result = match rule.evaluate(ctx).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        block = %self.name,
                        rule = rule.key(),
                        error = %err,
                        "rule evaluation failed, treating as no-match"
                    );
                    RuleExitResult::NoMatch
                }
            };
            if !result.is_match() {
                debug!(block = %self.name, rule = rule.key(), "rule did not match");
                return RuleExitResult::NoMatch;
            }
        }
        debug!(block = %self.name, "all rules matched");
        RuleExitResult::Match
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("rules", &self.rules)
            .finish()
    }
}

/// The ACL verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclDecision {
    /// A block with an allow policy matched.
    Allow {
        /// Name of the deciding block.
        block: String,
    },
    /// A block with a forbid policy matched, or no block matched at all.
    Forbid {
        /// Name of the deciding block, or `None` when nothing matched.
        block: Option<String>,
    },
}

impl AclDecision {
    /// Returns `true` when the request is permitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Ordered collection of blocks; the first matching block wins.
#[derive(Debug)]
pub struct Acl {
    blocks: Vec<Block>,
}

impl Acl {
    /// Build the ACL from blocks in declaration order.
    #[must_use]
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Evaluate blocks sequentially until one matches.
    ///
    /// Blocks after the first match are never evaluated, so their rules'
    /// side effects (headers, identity) never happen.
    pub async fn check(&self, ctx: &mut RequestContext) -> AclDecision {
        let matched = first_match(&self.blocks, async |block: &Block| {
            block.check(ctx).await.is_match()
        })
        .await;

        match matched {
            Some(block) => match block.policy {
                BlockPolicy::Allow => AclDecision::Allow {
                    block: block.name.clone(),
                },
                BlockPolicy::Forbid => {
                    debug!(block = %block.name, request = %ctx.id(), "request explicitly forbidden");
                    AclDecision::Forbid {
                        block: Some(block.name.clone()),
                    }
                }
            },
            None => {
                debug!(request = %ctx.id(), "no block matched, forbidding");
                AclDecision::Forbid { block: None }
            }
        }
    }
}

/// Sequential first-success fold over async checks.
///
/// Candidates run strictly in declaration order and the fold stops at the
/// first success; there is no speculative parallel execution, so any
/// caller-visible side effects happen in order.
pub async fn first_match<'a, T, F>(items: &'a [T], mut check: F) -> Option<&'a T>
where
    F: AsyncFnMut(&'a T) -> bool,
{
    for item in items {
        if check(item).await {
            return Some(item);
        }
    }
    None
}
