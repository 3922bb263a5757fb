use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryStatus {
    pub current_branch: Option<String>,
    pub is_detached_head: bool,
    pub has_pending_changes: bool,
    pub number_of_pending_changes: usize,
    pub local_only_commits: bool,
}

#[derive(Debug, Clone)]
pub enum SubmoduleEntry {
    Initialized(Arc<RepositoryNode>),
    /// Recorded by the parent but never checked out.
    Uninitialized(PathBuf),
}

impl SubmoduleEntry {
    pub fn node(&self) -> Option<&Arc<RepositoryNode>> {
        match self {
            SubmoduleEntry::Initialized(node) => Some(node),
            SubmoduleEntry::Uninitialized(_) => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self, SubmoduleEntry::Initialized(_))
    }
}

/// One repository root, submodule or linked worktree.
///
/// Nodes are shared through `Arc` and updated in place, so a holder of a node
/// sees the results of later refreshes. Scalar status is written only by the
/// task refreshing the node; child maps each have their own lock.
#[derive(Debug)]
pub struct RepositoryNode {
    working_directory: PathBuf,
    is_worktree: bool,
    is_refreshing: AtomicBool,
    status: RwLock<RepositoryStatus>,
    submodules: Mutex<BTreeMap<PathBuf, SubmoduleEntry>>,
    worktrees: Mutex<BTreeMap<PathBuf, Arc<RepositoryNode>>>,
}

impl RepositoryNode {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self::with_kind(working_directory.into(), false)
    }

    pub fn new_worktree(working_directory: impl Into<PathBuf>) -> Self {
        Self::with_kind(working_directory.into(), true)
    }

    fn with_kind(working_directory: PathBuf, is_worktree: bool) -> Self {
        Self {
            working_directory,
            is_worktree,
            is_refreshing: AtomicBool::new(false),
            status: RwLock::new(RepositoryStatus::default()),
            submodules: Mutex::new(BTreeMap::new()),
            worktrees: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn is_worktree(&self) -> bool {
        self.is_worktree
    }

    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing.load(Ordering::Acquire)
    }

    pub(crate) fn set_refreshing(&self, value: bool) {
        self.is_refreshing.store(value, Ordering::Release);
    }

    pub fn status(&self) -> RepositoryStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_status(&self, status: RepositoryStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn current_branch(&self) -> Option<String> {
        self.status().current_branch
    }

    pub fn is_detached_head(&self) -> bool {
        self.status().is_detached_head
    }

    pub fn has_pending_changes(&self) -> bool {
        self.status().has_pending_changes
    }

    pub fn number_of_pending_changes(&self) -> usize {
        self.status().number_of_pending_changes
    }

    pub fn local_only_commits(&self) -> bool {
        self.status().local_only_commits
    }

    /// Snapshot of the submodule map, ordered by path.
    pub fn submodules(&self) -> Vec<(PathBuf, SubmoduleEntry)> {
        self.lock_submodules()
            .iter()
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect()
    }

    pub fn submodule(&self, path: &Path) -> Option<SubmoduleEntry> {
        self.lock_submodules().get(path).cloned()
    }

    /// Snapshot of the worktree map, ordered by path.
    pub fn worktrees(&self) -> Vec<Arc<RepositoryNode>> {
        self.lock_worktrees().values().cloned().collect()
    }

    pub fn worktree(&self, path: &Path) -> Option<Arc<RepositoryNode>> {
        self.lock_worktrees().get(path).cloned()
    }

    pub(crate) fn lock_submodules(&self) -> MutexGuard<'_, BTreeMap<PathBuf, SubmoduleEntry>> {
        self.submodules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_worktrees(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Arc<RepositoryNode>>> {
        self.worktrees.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{RepositoryNode, RepositoryStatus, SubmoduleEntry};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn status_updates_are_visible_through_shared_node() {
        let node = Arc::new(RepositoryNode::new("/repos/a"));
        let holder = Arc::clone(&node);

        node.set_status(RepositoryStatus {
            current_branch: Some("main".to_string()),
            has_pending_changes: true,
            number_of_pending_changes: 2,
            ..RepositoryStatus::default()
        });

        assert_eq!(holder.current_branch().as_deref(), Some("main"));
        assert_eq!(holder.number_of_pending_changes(), 2);
    }

    #[test]
    fn submodule_entries_are_ordered_by_path() {
        let node = RepositoryNode::new("/repos/a");
        {
            let mut submodules = node.lock_submodules();
            submodules.insert(
                PathBuf::from("/repos/a/z"),
                SubmoduleEntry::Uninitialized(PathBuf::from("/repos/a/z")),
            );
            submodules.insert(
                PathBuf::from("/repos/a/b"),
                SubmoduleEntry::Initialized(Arc::new(RepositoryNode::new("/repos/a/b"))),
            );
        }

        let entries = node.submodules();
        assert_eq!(entries[0].0, PathBuf::from("/repos/a/b"));
        assert!(entries[0].1.is_initialized());
        assert!(entries[1].1.node().is_none());
    }

    #[test]
    fn worktree_kind_is_fixed_at_creation() {
        assert!(!RepositoryNode::new("/repos/alpha").is_worktree());
        assert!(RepositoryNode::new_worktree("/repos/alpha-wt").is_worktree());
    }
}
