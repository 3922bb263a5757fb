use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, ScanError};
use crate::inspector::{BranchDivergence, HeadState, RepositoryInspector, SubmoduleInfo};
use crate::paths::cache_root;

/// [`RepositoryInspector`] backed by the `git` binary found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }
}

impl RepositoryInspector for GitCli {
    fn is_valid_repository(&self, path: &Path) -> bool {
        if !path.join(".git").exists() {
            return false;
        }

        // git searches parent directories, so a plain directory inside another
        // working tree would otherwise answer for that enclosing repository.
        run_git_capture(repo_args(path, &["rev-parse", "--show-toplevel"]))
            .map(|output| same_directory(Path::new(output.trim()), path))
            .unwrap_or(false)
    }

    fn head(&self, path: &Path) -> Result<HeadState> {
        let output = git_command()
            .args(repo_args(path, &["symbolic-ref", "--quiet", "--short", "HEAD"]))
            .output()?;
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let branch = stdout.trim();
            if !branch.is_empty() {
                return Ok(HeadState {
                    branch: branch.to_string(),
                    is_detached: false,
                });
            }
        }

        let sha = run_git_capture(repo_args(path, &["rev-parse", "--short", "HEAD"]))?;
        Ok(HeadState {
            branch: format!("(HEAD detached at {})", sha.trim()),
            is_detached: true,
        })
    }

    fn dirty_count(&self, path: &Path) -> Result<usize> {
        // Refresh stat info first; without it a touched-but-unchanged file
        // shows up as modified. Exit status 1 only means "needs update".
        let _ = git_command()
            .args(repo_args(path, &["update-index", "-q", "--refresh"]))
            .output()?;

        let output = run_git_capture(repo_args(
            path,
            &[
                "status",
                "--porcelain=v1",
                "--untracked-files=no",
                "--ignore-submodules=dirty",
            ],
        ))?;
        Ok(count_status_entries(&output))
    }

    fn local_branch_divergence(&self, path: &Path) -> Result<Vec<BranchDivergence>> {
        let output = run_git_capture(repo_args(
            path,
            &[
                "for-each-ref",
                "--format=%(refname:short)%00%(upstream)%00%(upstream:track,nobracket)",
                "refs/heads",
            ],
        ))?;
        Ok(parse_branch_divergence(&output))
    }

    fn list_submodules(&self, path: &Path) -> Result<Vec<SubmoduleInfo>> {
        if !path.join(".gitmodules").is_file() {
            return Ok(Vec::new());
        }

        let output = run_git_capture(repo_args(path, &["submodule", "status"]))?;
        Ok(parse_submodule_status(&output))
    }

    fn list_worktrees(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let output = run_git_capture(repo_args(path, &["worktree", "list", "--porcelain"]))?;
        Ok(parse_worktrees(&output))
    }
}

fn same_directory(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn count_status_entries(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.len() >= 3)
        .filter(|line| {
            let status = &line[..2];
            status != "??" && status != "!!"
        })
        .count()
}

fn parse_branch_divergence(output: &str) -> Vec<BranchDivergence> {
    let mut branches = Vec::new();

    for line in output.lines() {
        let mut parts = line.split('\0');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        let upstream = parts.next().unwrap_or_default().trim();
        let track = parts.next().unwrap_or_default().trim();

        let gone = track == "gone";
        let (ahead, behind) = parse_track(track);
        branches.push(BranchDivergence {
            name: name.to_string(),
            has_tracked_remote: !upstream.is_empty() && !gone,
            ahead,
            behind,
        });
    }

    branches
}

fn parse_track(track: &str) -> (u32, u32) {
    let mut ahead = 0;
    let mut behind = 0;

    for part in track.split(',') {
        let mut words = part.split_whitespace();
        let kind = words.next().unwrap_or_default();
        let count = words
            .next()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(0);
        match kind {
            "ahead" => ahead = count,
            "behind" => behind = count,
            _ => {}
        }
    }

    (ahead, behind)
}

fn parse_submodule_status(output: &str) -> Vec<SubmoduleInfo> {
    let mut submodules = Vec::new();

    for line in output.lines() {
        let Some(flag) = line.chars().next() else {
            continue;
        };
        let rest = &line[flag.len_utf8()..];
        let Some((_sha, path_part)) = rest.split_once(' ') else {
            continue;
        };

        // Initialized entries end with " (<describe>)".
        let path_part = match path_part.rfind(" (") {
            Some(idx) if path_part.ends_with(')') => &path_part[..idx],
            _ => path_part,
        };
        let path_part = path_part.trim();
        if path_part.is_empty() {
            continue;
        }

        submodules.push(SubmoduleInfo {
            path: PathBuf::from(path_part),
            is_initialized: flag != '-',
        });
    }

    submodules
}

fn parse_worktrees(output: &str) -> Vec<PathBuf> {
    let mut worktrees = Vec::new();
    let mut current = WorktreeRecord::default();
    let mut seen_main = false;

    for line in output.lines() {
        if line.trim().is_empty() {
            if let Some(path) = current.finish(&mut seen_main) {
                worktrees.push(path);
            }
            current = WorktreeRecord::default();
            continue;
        }

        if let Some(path) = line.strip_prefix("worktree ") {
            current.path = Some(PathBuf::from(path));
            continue;
        }

        if line.trim() == "bare" {
            current.is_bare = true;
        }
    }

    if let Some(path) = current.finish(&mut seen_main) {
        worktrees.push(path);
    }

    worktrees
}

#[derive(Default)]
struct WorktreeRecord {
    path: Option<PathBuf>,
    is_bare: bool,
}

impl WorktreeRecord {
    /// The first record is always the main worktree and is skipped.
    fn finish(self, seen_main: &mut bool) -> Option<PathBuf> {
        let path = self.path?;
        if !*seen_main {
            *seen_main = true;
            return None;
        }
        if self.is_bare {
            return None;
        }
        Some(path)
    }
}

fn repo_args(path: &Path, args: &[&str]) -> Vec<OsString> {
    let mut out = vec![OsString::from("-C"), path.as_os_str().to_os_string()];
    out.extend(args.iter().map(OsString::from));
    out
}

fn run_git_capture(args: Vec<OsString>) -> Result<String> {
    let output = git_command().args(&args).output()?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).to_string());
    }

    Err(ScanError::GitCommand {
        command: format!("git {}", args_to_string(&args)),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn args_to_string(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn git_command() -> Command {
    let mut command = Command::new("git");
    command.env("GIT_TERMINAL_PROMPT", "0");
    apply_safe_cwd(&mut command);
    command
}

fn apply_safe_cwd(command: &mut Command) {
    if std::env::current_dir().is_ok() {
        return;
    }

    if let Ok(path) = cache_root() {
        let _ = fs::create_dir_all(&path);
        command.current_dir(path);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        count_status_entries, parse_branch_divergence, parse_submodule_status, parse_worktrees,
    };
    use std::path::PathBuf;

    #[test]
    fn count_status_entries_skips_untracked_and_ignored() {
        let output = " M src/lib.rs\nM  staged.rs\n D removed.rs\nR  old.rs -> new.rs\n?? new.txt\n!! target\n";
        assert_eq!(count_status_entries(output), 4);
        assert_eq!(count_status_entries(""), 0);
    }

    #[test]
    fn parse_branch_divergence_reads_tracking_state() {
        let output = "main\0refs/remotes/origin/main\0\n\
                      feature\0\0\n\
                      ahead\0refs/remotes/origin/ahead\0ahead 2\n\
                      both\0refs/remotes/origin/both\0ahead 1, behind 3\n\
                      stale\0refs/remotes/origin/stale\0gone\n";
        let branches = parse_branch_divergence(output);
        assert_eq!(branches.len(), 5);

        assert!(branches[0].has_tracked_remote);
        assert!(!branches[0].has_local_only_commits());

        assert!(!branches[1].has_tracked_remote);
        assert!(branches[1].has_local_only_commits());

        assert_eq!((branches[2].ahead, branches[2].behind), (2, 0));
        assert!(branches[2].is_ahead_of_remote());

        assert_eq!((branches[3].ahead, branches[3].behind), (1, 3));

        assert!(!branches[4].has_tracked_remote);
    }

    #[test]
    fn parse_submodule_status_detects_uninitialized() {
        let output = "-1111111111111111111111111111111111111111 libs/x\n \
                      2222222222222222222222222222222222222222 libs/y (heads/main)\n\
                      +3333333333333333333333333333333333333333 vendor/with space (v1.0-2-g3333333)\n";
        let submodules = parse_submodule_status(output);
        assert_eq!(submodules.len(), 3);
        assert_eq!(submodules[0].path, PathBuf::from("libs/x"));
        assert!(!submodules[0].is_initialized);
        assert_eq!(submodules[1].path, PathBuf::from("libs/y"));
        assert!(submodules[1].is_initialized);
        assert_eq!(submodules[2].path, PathBuf::from("vendor/with space"));
        assert!(submodules[2].is_initialized);
    }

    #[test]
    fn parse_worktrees_skips_main_worktree() {
        let output = "worktree /repos/a\nHEAD 1111\nbranch refs/heads/main\n\n\
                      worktree /repos/a-feature\nHEAD 2222\nbranch refs/heads/feature\n\n\
                      worktree /repos/a-detached\nHEAD 3333\ndetached\n";
        let worktrees = parse_worktrees(output);
        assert_eq!(
            worktrees,
            vec![
                PathBuf::from("/repos/a-feature"),
                PathBuf::from("/repos/a-detached")
            ]
        );
    }

    #[test]
    fn parse_worktrees_without_links_is_empty() {
        let output = "worktree /repos/a\nHEAD 1111\nbranch refs/heads/main\n\n";
        assert!(parse_worktrees(output).is_empty());
    }
}
