//! The rule implementations the ACL composes into blocks.

pub mod auth_key;
pub mod external_auth;
pub mod groups_provider;
pub mod hidden_apps;
pub mod indices;
pub mod jwt_auth;
pub mod kibana;
pub mod repositories;
pub mod snapshots;
pub mod zero_knowledge;

pub use auth_key::{AuthKeyRule, AuthKeyRuleSettings, AuthKeySha256Rule, AuthKeySha256RuleSettings};
pub use external_auth::{AuthenticationServiceClient, ExternalAuthenticationRule};
pub use groups_provider::{
    GroupsProviderAuthorizationRule, GroupsProviderClient, GroupsProviderRuleSettings,
};
pub use hidden_apps::{KibanaHideAppsRule, KibanaHideAppsRuleSettings};
pub use indices::{IndicesRule, IndicesRuleSettings};
pub use jwt_auth::{JwtAuthRule, JwtAuthRuleSettings};
pub use kibana::{KibanaAccess, KibanaAccessRule, KibanaAccessRuleSettings};
pub use repositories::{RepositoriesRule, RepositoriesRuleSettings};
pub use snapshots::{SnapshotsRule, SnapshotsRuleSettings};
pub use zero_knowledge::ZeroKnowledgeFilter;
