//! The rule contract: synchronous and asynchronous decision units.
//!
//! Rules come in exactly two shapes. A synchronous rule is a pure function
//! of the request context and never blocks. An asynchronous rule performs
//! an external lookup (directory, HTTP groups provider) and returns a
//! future. The block evaluator pattern-matches on [`Rule`] instead of
//! dispatching through a shared base type.

use async_trait::async_trait;

use crate::Result;
use crate::context::RequestContext;

/// The outcome of evaluating one rule against a request.
///
/// Carries no payload: side effects happen through [`RequestContext`]
/// mutation, not through the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleExitResult {
    /// The rule matched; evaluation continues with the next rule.
    Match,
    /// The rule did not match; the enclosing block short-circuits.
    NoMatch,
}

impl RuleExitResult {
    /// Returns `true` for [`RuleExitResult::Match`].
    #[must_use]
    pub fn is_match(self) -> bool {
        matches!(self, Self::Match)
    }
}

impl From<bool> for RuleExitResult {
    fn from(matched: bool) -> Self {
        if matched { Self::Match } else { Self::NoMatch }
    }
}

/// What a rule contributes to a block, used for construction-time sanity
/// checks (an authorization rule without an authentication rule is a
/// configuration error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Establishes the caller identity.
    Authentication,
    /// Consumes the caller identity to grant or deny.
    Authorization,
    /// Anything else (resource filtering, side-effect-only rules).
    Other,
}

/// A synchronous rule: a pure function of the context, no I/O.
pub trait SyncRule: Send + Sync {
    /// Identifier binding this rule type to its configuration attribute.
    fn key(&self) -> &'static str;

    /// The rule's contribution to the block.
    fn kind(&self) -> RuleKind {
        RuleKind::Other
    }

    /// Evaluate the rule, possibly mutating the context.
    fn check(&self, ctx: &mut RequestContext) -> RuleExitResult;
}

/// An asynchronous rule: the decision requires an external lookup.
///
/// Lookup failures are returned as errors; the block evaluator is the only
/// place that logs them and converts them to NO_MATCH (fail-closed).
#[async_trait]
pub trait AsyncRule: Send + Sync {
    /// Identifier binding this rule type to its configuration attribute.
    fn key(&self) -> &'static str;

    /// The rule's contribution to the block.
    fn kind(&self) -> RuleKind {
        RuleKind::Other
    }

    /// Evaluate the rule, possibly mutating the context.
    async fn check(&self, ctx: &mut RequestContext) -> Result<RuleExitResult>;
}

/// Tagged variant over the two rule shapes.
pub enum Rule {
    /// A pure synchronous rule.
    Sync(Box<dyn SyncRule>),
    /// A future-returning rule.
    Async(Box<dyn AsyncRule>),
}

impl Rule {
    /// The rule's configuration key.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Sync(rule) => rule.key(),
            Self::Async(rule) => rule.key(),
        }
    }

    /// The rule's contribution to the block.
    #[must_use]
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Sync(rule) => rule.kind(),
            Self::Async(rule) => rule.kind(),
        }
    }

    /// Evaluate the rule. Synchronous rules cannot fail; asynchronous
    /// lookup errors are surfaced for the block evaluator to convert.
    pub(crate) async fn evaluate(&self, ctx: &mut RequestContext) -> Result<RuleExitResult> {
        match self {
            Self::Sync(rule) => Ok(rule.check(ctx)),
            Self::Async(rule) => rule.check(ctx).await,
        }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(rule) => write!(f, "Rule::Sync({})", rule.key()),
            Self::Async(rule) => write!(f, "Rule::Async({})", rule.key()),
        }
    }
}
