//! Repository records: the root namespace for commits and branches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BranchName, RepositoryId};

/// A repository. Owns branches and namespaces commit ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    /// the branch that can never be deleted
    pub default_branch: BranchName,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// create a new repository record with a generated id
    pub fn new(name: impl Into<String>, default_branch: BranchName) -> Self {
        Self {
            id: RepositoryId::generate(),
            name: name.into(),
            default_branch,
            created_at: Utc::now(),
        }
    }

    pub fn is_default_branch(&self, name: &BranchName) -> bool {
        &self.default_branch == name
    }
}
