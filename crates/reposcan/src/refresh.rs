use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::context::ScanContext;
use crate::error::{Result, ScanError};
use crate::events::{log_observer_failure, EventSink, Notifier};
use crate::inspector::{BranchDivergence, SubmoduleInfo};
use crate::model::{RepositoryNode, RepositoryStatus, SubmoduleEntry};
use crate::paths::normalize_path;
use crate::progress::ProgressTracker;

/// Refreshes a repository node and, recursively, its submodules and linked
/// worktrees. Children are created on first sight and reused afterwards.
pub struct RefreshEngine<'a> {
    ctx: &'a ScanContext,
}

impl<'a> RefreshEngine<'a> {
    pub fn new(ctx: &'a ScanContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &'a ScanContext {
        self.ctx
    }

    /// Refreshes `node` and everything below it, then counts one unit of
    /// progress. Failures are logged and reported to `sink`, never returned.
    pub fn refresh(
        &self,
        node: &Arc<RepositoryNode>,
        sink: &dyn EventSink,
        progress: Option<&ProgressTracker<'_>>,
    ) {
        let notifier = Notifier::new(sink);
        self.ctx
            .pool()
            .install(|| self.refresh_node(node, notifier));

        if let Some(progress) = progress {
            if let Err(err) = progress.advance() {
                error!(error = %err, "progress tracker misuse");
            }
        }
    }

    pub(crate) fn refresh_node(&self, node: &Arc<RepositoryNode>, notifier: Notifier<'_>) {
        if self.ctx.is_cancelled() {
            return;
        }
        let _entered = self.ctx.span().enter();
        let path = node.working_directory();

        if !path.is_dir() {
            error!(path = %path.display(), "working directory is invalid");
            return;
        }

        debug!(path = %path.display(), "refreshing");
        node.set_refreshing(true);
        let result = self.refresh_contents(node, notifier);
        node.set_refreshing(false);

        match result {
            Ok(()) => log_observer_failure(notifier.refresh_completed(node)),
            Err(ScanError::Cancelled) => {
                debug!(path = %path.display(), "refresh cancelled");
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to refresh repository");
                log_observer_failure(
                    notifier.send_message(&format!("Failed to refresh {}: {err}", path.display())),
                );
            }
        }
    }

    fn refresh_contents(&self, node: &Arc<RepositoryNode>, notifier: Notifier<'_>) -> Result<()> {
        let inspector = self.ctx.inspector();
        let path = node.working_directory();

        if !inspector.is_valid_repository(path) {
            return Err(ScanError::Inspection {
                path: path.to_path_buf(),
                message: "not the root of a git working tree".to_string(),
            });
        }

        let submodules = inspector.list_submodules(path)?;
        // A worktree shares its metadata with the repository that owns it;
        // asking it for worktrees would walk straight back to the owner.
        let worktrees = if node.is_worktree() {
            Vec::new()
        } else {
            inspector.list_worktrees(path)?
        };

        rayon::scope(|scope| {
            for info in submodules {
                scope.spawn(move |_| self.refresh_submodule(node, info, notifier));
            }
            for worktree in worktrees {
                scope.spawn(move |_| self.refresh_worktree(node, worktree, notifier));
            }
        });

        if self.ctx.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let head = inspector.head(path)?;
        let pending = inspector.dirty_count(path)?;
        let branches = inspector.local_branch_divergence(path)?;
        for branch in branches.iter().filter(|branch| branch.has_local_only_commits()) {
            debug!(
                path = %path.display(),
                branch = %branch.name,
                tracked = branch.has_tracked_remote,
                ahead = branch.ahead,
                behind = branch.behind,
                "branch has local-only commits"
            );
        }

        node.set_status(RepositoryStatus {
            current_branch: Some(head.branch),
            is_detached_head: head.is_detached,
            has_pending_changes: pending > 0,
            number_of_pending_changes: pending,
            local_only_commits: branches
                .iter()
                .any(BranchDivergence::has_local_only_commits),
        });
        Ok(())
    }

    fn refresh_submodule(
        &self,
        parent: &Arc<RepositoryNode>,
        info: SubmoduleInfo,
        notifier: Notifier<'_>,
    ) {
        if self.ctx.is_cancelled() {
            return;
        }
        let path = normalize_path(&parent.working_directory().join(&info.path));

        if !info.is_initialized {
            let created = {
                let mut submodules = parent.lock_submodules();
                match submodules.get(&path) {
                    Some(SubmoduleEntry::Uninitialized(_)) => false,
                    _ => {
                        submodules.insert(path.clone(), SubmoduleEntry::Uninitialized(path.clone()));
                        true
                    }
                }
            };
            if created {
                log_observer_failure(notifier.uninitialized_submodule_created(parent, &path));
            }
            return;
        }

        let existing = parent
            .lock_submodules()
            .get(&path)
            .and_then(|entry| entry.node().cloned());
        let child = match existing {
            Some(child) => child,
            None => {
                if !self.ctx.inspector().is_valid_repository(&path) {
                    warn!(path = %path.display(), "unknown submodule state");
                    return;
                }

                let candidate = Arc::new(RepositoryNode::new(path.clone()));
                let (child, created) = {
                    let mut submodules = parent.lock_submodules();
                    match submodules.get(&path).and_then(SubmoduleEntry::node) {
                        Some(existing) => (Arc::clone(existing), false),
                        None => {
                            submodules.insert(
                                path.clone(),
                                SubmoduleEntry::Initialized(Arc::clone(&candidate)),
                            );
                            (candidate, true)
                        }
                    }
                };
                if created {
                    log_observer_failure(notifier.submodule_created(parent, &child));
                }
                child
            }
        };

        self.refresh_node(&child, notifier);
    }

    fn refresh_worktree(&self, owner: &Arc<RepositoryNode>, path: PathBuf, notifier: Notifier<'_>) {
        if self.ctx.is_cancelled() {
            return;
        }
        let path = normalize_path(&path);

        let existing = owner.lock_worktrees().get(&path).cloned();
        let child = match existing {
            Some(child) => child,
            None => {
                if !self.ctx.inspector().is_valid_repository(&path) {
                    warn!(path = %path.display(), "skipping invalid worktree");
                    return;
                }

                let candidate = Arc::new(RepositoryNode::new_worktree(path.clone()));
                let (child, created) = {
                    let mut worktrees = owner.lock_worktrees();
                    match worktrees.get(&path) {
                        Some(existing) => (Arc::clone(existing), false),
                        None => {
                            worktrees.insert(path.clone(), Arc::clone(&candidate));
                            (candidate, true)
                        }
                    }
                };
                if created {
                    log_observer_failure(notifier.worktree_created(&child));
                }
                child
            }
        };

        self.refresh_node(&child, notifier);
    }
}
