//! Configuration for the version-control core.

use crate::review::MergePolicy;
use crate::types::BranchName;

/// default cap on a single `list_ancestry` call
pub const DEFAULT_MAX_ANCESTRY_LIMIT: usize = 10_000;

/// default message for merge commits; `{source}` and `{target}` are replaced
pub const DEFAULT_MERGE_MESSAGE: &str = "Merge branch '{source}' into '{target}'";

/// Core configuration options.
#[derive(Debug, Clone)]
pub struct VcsConfig {
    /// Default branch for repositories created without an explicit one.
    pub default_branch: BranchName,
    /// Upper bound applied to every ancestry listing.
    pub max_ancestry_limit: usize,
    /// Rules a merge request must satisfy before it can be merged.
    pub merge_policy: MergePolicy,
    /// Template for merge commit messages.
    pub merge_message_template: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            default_branch: BranchName::main(),
            max_ancestry_limit: DEFAULT_MAX_ANCESTRY_LIMIT,
            merge_policy: MergePolicy::default(),
            merge_message_template: DEFAULT_MERGE_MESSAGE.to_string(),
        }
    }
}

impl VcsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default branch name.
    pub fn default_branch(mut self, name: BranchName) -> Self {
        self.default_branch = name;
        self
    }

    /// Set the ancestry cap. Zero is raised to one.
    pub fn max_ancestry_limit(mut self, limit: usize) -> Self {
        self.max_ancestry_limit = limit.max(1);
        self
    }

    /// Set the merge policy.
    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Set the merge commit message template.
    pub fn merge_message_template(mut self, template: impl Into<String>) -> Self {
        self.merge_message_template = template.into();
        self
    }
}

/// fill a merge message template
pub(crate) fn render_merge_message(template: &str, source: &BranchName, target: &BranchName) -> String {
    template
        .replace("{source}", source.as_str())
        .replace("{target}", target.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VcsConfig::default();
        assert_eq!(config.default_branch, BranchName::main());
        assert_eq!(config.max_ancestry_limit, DEFAULT_MAX_ANCESTRY_LIMIT);
        assert_eq!(config.merge_policy.required_approvals, 0);
    }

    #[test]
    fn test_builder() {
        let config = VcsConfig::new()
            .default_branch(BranchName::new("trunk").unwrap())
            .max_ancestry_limit(0)
            .merge_policy(MergePolicy::new().required_approvals(2))
            .merge_message_template("merge {source}");

        assert_eq!(config.default_branch.as_str(), "trunk");
        assert_eq!(config.max_ancestry_limit, 1);
        assert_eq!(config.merge_policy.required_approvals, 2);
        assert_eq!(config.merge_message_template, "merge {source}");
    }

    #[test]
    fn test_render_merge_message() {
        let source = BranchName::new("feature/x").unwrap();
        let target = BranchName::main();
        assert_eq!(
            render_merge_message(DEFAULT_MERGE_MESSAGE, &source, &target),
            "Merge branch 'feature/x' into 'main'"
        );
    }
}
