use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::Scope;
use tracing::{debug, trace, warn};

use crate::context::ScanContext;
use crate::error::{Result, ScanError};
use crate::events::{log_observer_failure, EventSink, Notifier};
use crate::paths::{normalize_path, resolve_path};

const GIT_DIR_NAME: &str = ".git";

/// Finds repository roots, i.e. directories holding a `.git` directory.
pub struct PathScanner<'a> {
    ctx: &'a ScanContext,
}

impl<'a> PathScanner<'a> {
    pub fn new(ctx: &'a ScanContext) -> Self {
        Self { ctx }
    }

    /// Scans `root` and returns every repository root below it. Never fails:
    /// an unusable root yields an empty set plus a diagnostic, and unreadable
    /// directories are reported and skipped.
    pub fn scan(
        &self,
        root: &str,
        ignored_paths: &BTreeSet<String>,
        sink: &dyn EventSink,
    ) -> BTreeSet<PathBuf> {
        let notifier = Notifier::new(sink);
        let root_path = resolve_path(root);

        if !root_path.is_dir() {
            let err = ScanError::InvalidRoot(root_path);
            warn!(root, error = %err, "skipping search path");
            log_observer_failure(
                notifier.send_message(&format!("Could not get repository paths at {root}: {err}")),
            );
            return BTreeSet::new();
        }

        let ignored = ignored_paths
            .iter()
            .map(|path| resolve_path(path))
            .collect::<HashSet<_>>();
        let found = self.scan_path(&root_path, &ignored, notifier);

        log_observer_failure(
            notifier.send_message(&format!("Found {} repositories", found.len())),
        );
        found
    }

    /// Scans an already resolved directory. `ignored` must hold normalized
    /// absolute paths.
    pub fn scan_path(
        &self,
        root: &Path,
        ignored: &HashSet<PathBuf>,
        notifier: Notifier<'_>,
    ) -> BTreeSet<PathBuf> {
        let walk = Walk {
            ctx: self.ctx,
            notifier,
            ignored,
            found: Mutex::new(BTreeSet::new()),
        };

        let root = root.to_path_buf();
        self.ctx.pool().scope(|scope| walk.visit(scope, root));

        walk.found
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct Walk<'a> {
    ctx: &'a ScanContext,
    notifier: Notifier<'a>,
    ignored: &'a HashSet<PathBuf>,
    found: Mutex<BTreeSet<PathBuf>>,
}

impl<'a> Walk<'a> {
    fn visit<'scope>(&'scope self, scope: &Scope<'scope>, dir: PathBuf) {
        if self.ctx.is_cancelled() {
            return;
        }
        let _entered = self.ctx.span().enter();
        trace!(path = %dir.display(), "scanning directory");

        match self.read_subdirectories(&dir) {
            Ok(subdirectories) => {
                for subdirectory in subdirectories {
                    scope.spawn(move |scope| self.visit(scope, subdirectory));
                }
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
                log_observer_failure(self.notifier.send_message(&err.to_string()));
            }
        }
    }

    fn read_subdirectories(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|source| ScanError::Enumeration {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut subdirectories = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(path = %dir.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            // Symlinks report their own type here, so they are never followed.
            let is_dir = entry
                .file_type()
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == GIT_DIR_NAME {
                self.register(dir);
                continue;
            }
            if name.starts_with('.') {
                continue;
            }
            if is_hidden(&entry) {
                continue;
            }

            let path = entry.path();
            if self.ignored.contains(&normalize_path(&path)) {
                debug!(path = %path.display(), "ignored path");
                continue;
            }
            subdirectories.push(path);
        }

        Ok(subdirectories)
    }

    fn register(&self, repository_root: &Path) {
        let path = normalize_path(repository_root);
        let inserted = self
            .found
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone());
        if inserted {
            debug!(path = %path.display(), "found repository");
            log_observer_failure(
                self.notifier
                    .send_message(&format!("Found repository {}", path.display())),
            );
        }
    }
}

#[cfg(windows)]
fn is_hidden(entry: &fs::DirEntry) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    entry
        .metadata()
        .map(|metadata| metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        .unwrap_or(false)
}

#[cfg(target_os = "macos")]
fn is_hidden(entry: &fs::DirEntry) -> bool {
    use std::os::macos::fs::MetadataExt;
    const UF_HIDDEN: u32 = 0x8000;
    entry
        .metadata()
        .map(|metadata| metadata.st_flags() & UF_HIDDEN != 0)
        .unwrap_or(false)
}

#[cfg(not(any(windows, target_os = "macos")))]
fn is_hidden(_entry: &fs::DirEntry) -> bool {
    false
}
