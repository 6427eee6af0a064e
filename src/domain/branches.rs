//! Remote branch listing served by `/api/branches`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchList {
    pub branches: Vec<Branch>,
}

impl BranchList {
    /// Build a list sorted by branch name.
    pub fn new(mut branches: Vec<Branch>) -> Self {
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Self { branches }
    }
}
