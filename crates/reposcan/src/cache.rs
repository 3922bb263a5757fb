use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::forest::Forest;
use crate::model::{RepositoryNode, RepositoryStatus, SubmoduleEntry};
use crate::paths::{
    cache_root, cached_paths_path, report_path, CACHED_PATHS_FILE_NAME, REPORT_FILE_NAME,
};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ForestSnapshot {
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    search_paths: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    ignored_paths: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    repositories: BTreeMap<String, NodeSnapshot>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct NodeSnapshot {
    working_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_branch: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    is_detached_head: bool,
    #[serde(skip_serializing_if = "is_false")]
    has_pending_changes: bool,
    #[serde(skip_serializing_if = "is_zero")]
    number_of_pending_changes: usize,
    #[serde(skip_serializing_if = "is_false")]
    local_only_commits: bool,
    #[serde(skip_serializing_if = "is_false")]
    is_worktree: bool,
    /// `None` marks a submodule that is not checked out.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    submodules: BTreeMap<String, Option<NodeSnapshot>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    worktrees: BTreeMap<String, NodeSnapshot>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

impl NodeSnapshot {
    fn capture(node: &RepositoryNode) -> Self {
        let status = node.status();
        let submodules = node
            .submodules()
            .into_iter()
            .map(|(path, entry)| {
                let child = entry.node().map(|child| Self::capture(child));
                (path_key(&path), child)
            })
            .collect();
        let worktrees = node
            .worktrees()
            .iter()
            .map(|worktree| (path_key(worktree.working_directory()), Self::capture(worktree)))
            .collect();

        Self {
            working_directory: node.working_directory().to_path_buf(),
            current_branch: status.current_branch,
            is_detached_head: status.is_detached_head,
            has_pending_changes: status.has_pending_changes,
            number_of_pending_changes: status.number_of_pending_changes,
            local_only_commits: status.local_only_commits,
            is_worktree: node.is_worktree(),
            submodules,
            worktrees,
        }
    }

    fn restore(self, key: &str) -> Arc<RepositoryNode> {
        let working_directory = if self.working_directory.as_os_str().is_empty() {
            PathBuf::from(key)
        } else {
            self.working_directory
        };
        let node = if self.is_worktree {
            RepositoryNode::new_worktree(working_directory)
        } else {
            RepositoryNode::new(working_directory)
        };
        node.set_status(RepositoryStatus {
            current_branch: self.current_branch,
            is_detached_head: self.is_detached_head,
            has_pending_changes: self.has_pending_changes,
            number_of_pending_changes: self.number_of_pending_changes,
            local_only_commits: self.local_only_commits,
        });

        {
            let mut submodules = node.lock_submodules();
            for (key, child) in self.submodules {
                let path = PathBuf::from(&key);
                let entry = match child {
                    Some(child) => SubmoduleEntry::Initialized(child.restore(&key)),
                    None => SubmoduleEntry::Uninitialized(path.clone()),
                };
                submodules.insert(path, entry);
            }
        }
        {
            let mut worktrees = node.lock_worktrees();
            for (key, child) in self.worktrees {
                let child = child.restore(&key);
                worktrees.insert(child.working_directory().to_path_buf(), child);
            }
        }

        Arc::new(node)
    }
}

/// Reads the newline separated list of repository roots. Returns `None` when
/// no list has been saved yet.
pub fn load_cached_paths(file: &Path) -> Result<Option<Vec<PathBuf>>> {
    if !file.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(file)?;
    let paths = contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect();
    Ok(Some(paths))
}

pub fn save_cached_paths(file: &Path, paths: &[PathBuf]) -> Result<()> {
    ensure_parent(file)?;
    let mut output = String::new();
    for path in paths {
        output.push_str(&path.to_string_lossy());
        output.push('\n');
    }
    fs::write(file, output)?;
    debug!(file = %file.display(), count = paths.len(), "saved repository paths");
    Ok(())
}

pub fn forest_to_json(forest: &Forest) -> Result<String> {
    let snapshot = ForestSnapshot {
        search_paths: forest.search_paths().clone(),
        ignored_paths: forest.ignored_paths().clone(),
        repositories: forest
            .repositories()
            .iter()
            .map(|node| (path_key(node.working_directory()), NodeSnapshot::capture(node)))
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

pub fn forest_from_json(json: &str) -> Result<Forest> {
    let snapshot: ForestSnapshot = serde_json::from_str(json)?;
    let forest = Forest::with_paths(snapshot.search_paths, snapshot.ignored_paths);
    for (key, node) in snapshot.repositories {
        forest.insert_node(node.restore(&key));
    }
    Ok(forest)
}

pub fn load_cached_forest(file: &Path) -> Result<Option<Forest>> {
    if !file.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(file)?;
    forest_from_json(&contents).map(Some)
}

pub fn save_forest(forest: &Forest, file: &Path) -> Result<()> {
    ensure_parent(file)?;
    let mut output = forest_to_json(forest)?;
    output.push('\n');
    fs::write(file, output)?;
    debug!(file = %file.display(), repositories = forest.len(), "saved report");
    Ok(())
}

pub fn load_default_cached_paths() -> Result<Option<Vec<PathBuf>>> {
    load_cached_paths(&cached_paths_path()?)
}

pub fn save_default_cached_paths(paths: &[PathBuf]) -> Result<()> {
    save_cached_paths(&cached_paths_path()?, paths)
}

pub fn load_default_forest() -> Result<Option<Forest>> {
    load_cached_forest(&report_path()?)
}

pub fn save_default_forest(forest: &Forest) -> Result<()> {
    save_forest(forest, &report_path()?)
}

/// Removes the cached repository list and the saved report from `root`,
/// leaving the configuration in place. Returns how many files were removed.
pub fn clear_cache(root: &Path) -> Result<usize> {
    let mut removed = 0;
    for name in [CACHED_PATHS_FILE_NAME, REPORT_FILE_NAME] {
        if remove_file_if_exists(&root.join(name))? {
            removed += 1;
        }
    }
    debug!(root = %root.display(), removed, "cleared cache");
    Ok(removed)
}

/// Removes `root` and everything in it, configuration included.
pub fn delete_local_files(root: &Path) -> Result<bool> {
    match fs::remove_dir_all(root) {
        Ok(()) => {
            debug!(root = %root.display(), "deleted local files");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

pub fn clear_default_cache() -> Result<usize> {
    clear_cache(&cache_root()?)
}

pub fn delete_default_local_files() -> Result<bool> {
    delete_local_files(&cache_root()?)
}

fn remove_file_if_exists(file: &Path) -> Result<bool> {
    match fs::remove_file(file) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn ensure_parent(file: &Path) -> Result<()> {
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{forest_from_json, forest_to_json};
    use crate::config::Configuration;
    use crate::forest::Forest;
    use crate::model::{RepositoryNode, RepositoryStatus, SubmoduleEntry};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn sample_forest() -> Forest {
        let mut configuration = Configuration::default();
        configuration.add_search_path("~/src");
        let forest = Forest::new(&configuration);

        let (root, _) = forest.get_or_insert(Path::new("/src/app"));
        root.set_status(RepositoryStatus {
            current_branch: Some("main".to_string()),
            has_pending_changes: true,
            number_of_pending_changes: 3,
            ..RepositoryStatus::default()
        });
        root.lock_submodules().insert(
            PathBuf::from("/src/app/vendor"),
            SubmoduleEntry::Uninitialized(PathBuf::from("/src/app/vendor")),
        );
        root.lock_worktrees().insert(
            PathBuf::from("/src/app-feature"),
            Arc::new(RepositoryNode::new_worktree("/src/app-feature")),
        );
        forest
    }

    #[test]
    fn snapshot_omits_defaults_and_keeps_uninitialized_submodules() {
        let json = forest_to_json(&sample_forest()).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");

        let root = &value["repositories"]["/src/app"];
        assert_eq!(root["current_branch"], "main");
        assert_eq!(root["number_of_pending_changes"], 3);
        assert!(root.get("is_detached_head").is_none());
        assert!(root.get("local_only_commits").is_none());
        assert!(root["submodules"]["/src/app/vendor"].is_null());
        assert_eq!(root["worktrees"]["/src/app-feature"]["is_worktree"], true);
        assert!(value.get("ignored_paths").is_none());
    }

    #[test]
    fn snapshot_restores_tree_shape() {
        let json = forest_to_json(&sample_forest()).expect("serialize");
        let forest = forest_from_json(&json).expect("restore");

        assert!(forest.search_paths().contains("~/src"));
        let root = forest.get(Path::new("/src/app")).expect("root");
        assert_eq!(root.number_of_pending_changes(), 3);
        assert!(root.has_pending_changes());

        let vendor = root
            .submodule(Path::new("/src/app/vendor"))
            .expect("submodule");
        assert!(!vendor.is_initialized());

        let worktree = root
            .worktree(Path::new("/src/app-feature"))
            .expect("worktree");
        assert!(worktree.is_worktree());
        assert_eq!(worktree.current_branch(), None);
    }
}
