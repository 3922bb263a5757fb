//! Boundary to the git implementation that answers questions about one
//! repository. Everything the refresh engine knows about a working directory
//! comes through [`RepositoryInspector`].

use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadState {
    pub branch: String,
    pub is_detached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDivergence {
    pub name: String,
    pub has_tracked_remote: bool,
    pub ahead: u32,
    pub behind: u32,
}

impl BranchDivergence {
    pub fn is_ahead_of_remote(&self) -> bool {
        self.has_tracked_remote && self.ahead > 0
    }

    /// True when the branch holds commits its tracked remote does not.
    pub fn has_local_only_commits(&self) -> bool {
        !self.has_tracked_remote || self.is_ahead_of_remote()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleInfo {
    /// Path relative to the parent's working directory.
    pub path: PathBuf,
    pub is_initialized: bool,
}

pub trait RepositoryInspector: Send + Sync {
    fn is_valid_repository(&self, path: &Path) -> bool;

    fn head(&self, path: &Path) -> Result<HeadState>;

    /// Number of staged, modified and removed tracked entries, measured after
    /// the index stat cache has been refreshed.
    fn dirty_count(&self, path: &Path) -> Result<usize>;

    fn local_branch_divergence(&self, path: &Path) -> Result<Vec<BranchDivergence>>;

    fn list_submodules(&self, path: &Path) -> Result<Vec<SubmoduleInfo>>;

    /// Absolute paths of linked worktrees, excluding the main worktree.
    fn list_worktrees(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::BranchDivergence;

    fn branch(has_tracked_remote: bool, ahead: u32, behind: u32) -> BranchDivergence {
        BranchDivergence {
            name: "main".to_string(),
            has_tracked_remote,
            ahead,
            behind,
        }
    }

    #[test]
    fn untracked_branch_has_local_only_commits() {
        assert!(branch(false, 0, 0).has_local_only_commits());
    }

    #[test]
    fn tracked_branch_in_sync_or_behind_has_none() {
        assert!(!branch(true, 0, 0).has_local_only_commits());
        assert!(!branch(true, 0, 4).has_local_only_commits());
    }

    #[test]
    fn ahead_or_diverged_branch_has_local_only_commits() {
        assert!(branch(true, 2, 0).has_local_only_commits());
        assert!(branch(true, 1, 3).has_local_only_commits());
    }
}
