use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::config::Configuration;
use crate::context::ScanContext;
use crate::error::{Result, ScanError};
use crate::events::{log_observer_failure, EventSink, Notifier};
use crate::model::RepositoryNode;
use crate::paths::{normalize_path, resolve_path};
use crate::progress::ProgressTracker;
use crate::refresh::RefreshEngine;
use crate::scanner::PathScanner;

/// All root repositories found for one set of search paths. Refreshing the
/// same forest again updates the existing nodes in place.
#[derive(Debug, Default)]
pub struct Forest {
    search_paths: BTreeSet<String>,
    ignored_paths: BTreeSet<String>,
    repositories: Mutex<BTreeMap<PathBuf, Arc<RepositoryNode>>>,
}

impl Forest {
    pub fn new(configuration: &Configuration) -> Self {
        Self::with_paths(
            configuration.search_paths.clone(),
            configuration.ignored_paths.clone(),
        )
    }

    pub fn with_paths(search_paths: BTreeSet<String>, ignored_paths: BTreeSet<String>) -> Self {
        Self {
            search_paths,
            ignored_paths,
            repositories: Mutex::new(BTreeMap::new()),
        }
    }

    /// Discovers repository roots (unless `repository_paths` is given) and
    /// refreshes all of them.
    pub fn generate(
        configuration: &Configuration,
        engine: &RefreshEngine<'_>,
        repository_paths: Option<Vec<PathBuf>>,
        sink: &dyn EventSink,
        progress: &ProgressTracker<'_>,
    ) -> Result<Self> {
        let forest = Self::new(configuration);
        let paths = match repository_paths {
            Some(paths) => paths,
            None => forest
                .discover_paths(engine.context(), sink)?
                .into_iter()
                .collect(),
        };
        forest.refresh(engine, &paths, sink, progress);
        Ok(forest)
    }

    pub fn search_paths(&self) -> &BTreeSet<String> {
        &self.search_paths
    }

    pub fn ignored_paths(&self) -> &BTreeSet<String> {
        &self.ignored_paths
    }

    /// Scans every search path concurrently. Fails only when none of them
    /// is a directory.
    pub fn discover_paths(
        &self,
        ctx: &ScanContext,
        sink: &dyn EventSink,
    ) -> Result<BTreeSet<PathBuf>> {
        if !self
            .search_paths
            .iter()
            .any(|path| resolve_path(path).is_dir())
        {
            return Err(ScanError::NoValidSearchPaths);
        }

        let scanner = PathScanner::new(ctx);
        let found = Mutex::new(BTreeSet::new());
        ctx.pool().scope(|scope| {
            for search_path in &self.search_paths {
                let scanner = &scanner;
                let found = &found;
                scope.spawn(move |_| {
                    let paths = scanner.scan(search_path, &self.ignored_paths, sink);
                    found
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend(paths);
                });
            }
        });

        Ok(found.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Refreshes one root per distinct path on the context's pool, creating
    /// roots the first time a path is seen. Progress reaches its total even
    /// when cancellation leaves roots unqueued.
    pub fn refresh(
        &self,
        engine: &RefreshEngine<'_>,
        paths: &[PathBuf],
        sink: &dyn EventSink,
        progress: &ProgressTracker<'_>,
    ) {
        let notifier = Notifier::new(sink);
        let ctx = engine.context();
        let roots: BTreeSet<PathBuf> = paths.iter().map(|path| normalize_path(path)).collect();
        if roots.len() < paths.len() {
            debug!(
                requested = paths.len(),
                distinct = roots.len(),
                "ignoring duplicate repository paths"
            );
        }
        progress.start("Refreshing repositories", roots.len());

        ctx.pool().scope(|scope| {
            for path in &roots {
                if ctx.is_cancelled() {
                    debug!("refresh cancelled before all roots were queued");
                    break;
                }

                let (node, created) = self.get_or_insert(path);
                if created {
                    log_observer_failure(notifier.repository_created(&node));
                }
                log_observer_failure(
                    notifier.send_message(&format!("Refreshing {}", path.display())),
                );
                scope.spawn(move |_| engine.refresh(&node, sink, Some(progress)));
            }
        });

        if let Err(err) = progress.finish() {
            debug!(error = %err, "progress was not started");
        }
    }

    /// Returns the root node for `path`, creating it if needed. The flag is
    /// true when the node was created by this call.
    pub fn get_or_insert(&self, path: &Path) -> (Arc<RepositoryNode>, bool) {
        let key = normalize_path(path);
        let mut repositories = self.lock_repositories();
        if let Some(node) = repositories.get(&key) {
            return (Arc::clone(node), false);
        }
        let node = Arc::new(RepositoryNode::new(key.clone()));
        repositories.insert(key, Arc::clone(&node));
        (node, true)
    }

    pub(crate) fn insert_node(&self, node: Arc<RepositoryNode>) {
        let key = normalize_path(node.working_directory());
        self.lock_repositories().insert(key, node);
    }

    pub fn get(&self, path: &Path) -> Option<Arc<RepositoryNode>> {
        self.lock_repositories().get(&normalize_path(path)).cloned()
    }

    pub fn repositories(&self) -> Vec<Arc<RepositoryNode>> {
        self.lock_repositories().values().cloned().collect()
    }

    pub fn repository_paths(&self) -> Vec<PathBuf> {
        self.lock_repositories().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_repositories().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_repositories().is_empty()
    }

    fn lock_repositories(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Arc<RepositoryNode>>> {
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::Forest;
    use crate::config::Configuration;
    use std::path::Path;
    use std::sync::Arc;

    #[test]
    fn get_or_insert_reuses_existing_roots() {
        let forest = Forest::new(&Configuration::default());
        let (first, created) = forest.get_or_insert(Path::new("/repos/a"));
        assert!(created);
        let (second, created) = forest.get_or_insert(Path::new("/repos/a"));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn repository_paths_are_sorted() {
        let forest = Forest::new(&Configuration::default());
        forest.get_or_insert(Path::new("/repos/b"));
        forest.get_or_insert(Path::new("/repos/a"));
        let paths = forest.repository_paths();
        assert_eq!(paths[0], Path::new("/repos/a"));
        assert_eq!(paths[1], Path::new("/repos/b"));
        assert!(forest.get(Path::new("/repos/c")).is_none());
    }
}
