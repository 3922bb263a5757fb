use std::fmt::Write as _;
use std::path::Path;

use reposcan::paths::display_path_with_tilde;
use reposcan::{Forest, RepositoryNode, SubmoduleEntry};

const INDENT: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Filter {
    All,
    /// Only nodes with pending changes, plus the parents leading to them.
    PendingChanges,
}

impl Filter {
    fn keeps(self, node: &RepositoryNode) -> bool {
        match self {
            Filter::All => true,
            Filter::PendingChanges => {
                node.has_pending_changes()
                    || node
                        .submodules()
                        .iter()
                        .filter_map(|(_, entry)| entry.node())
                        .any(|child| self.keeps(child))
                    || node.worktrees().iter().any(|child| self.keeps(child))
            }
        }
    }
}

pub(crate) fn render_forest(forest: &Forest, home: &Path, filter: Filter) -> String {
    let repositories = forest
        .repositories()
        .into_iter()
        .filter(|node| filter.keeps(node))
        .collect::<Vec<_>>();
    if repositories.is_empty() {
        return match filter {
            Filter::All => "no repositories\n".to_string(),
            Filter::PendingChanges => "no repositories with pending changes\n".to_string(),
        };
    }

    let mut out = String::new();
    for node in repositories {
        render_node(&mut out, &node, home, filter, 0, None);
    }
    out
}

fn render_node(
    out: &mut String,
    node: &RepositoryNode,
    home: &Path,
    filter: Filter,
    depth: usize,
    label: Option<&str>,
) {
    let status = node.status();
    let indent = INDENT.repeat(depth);
    let label = label.map(|label| format!("{label} ")).unwrap_or_default();
    let path = display_path_with_tilde(node.working_directory(), home);
    let branch = status.current_branch.as_deref().unwrap_or("-");

    let mut flags = Vec::new();
    if status.is_detached_head {
        flags.push("detached".to_string());
    }
    if status.has_pending_changes {
        flags.push(format!("{} changed", status.number_of_pending_changes));
    }
    if status.local_only_commits {
        flags.push("local commits".to_string());
    }

    let _ = write!(out, "{indent}{label}{path}  {branch}");
    if !flags.is_empty() {
        let _ = write!(out, "  [{}]", flags.join(", "));
    }
    out.push('\n');

    for (path, entry) in node.submodules() {
        match entry {
            SubmoduleEntry::Initialized(child) => {
                if filter.keeps(&child) {
                    render_node(out, &child, home, filter, depth + 1, Some("submodule"));
                }
            }
            SubmoduleEntry::Uninitialized(_) if filter == Filter::All => {
                let _ = writeln!(
                    out,
                    "{}submodule {}  (uninitialized)",
                    INDENT.repeat(depth + 1),
                    display_path_with_tilde(&path, home)
                );
            }
            SubmoduleEntry::Uninitialized(_) => {}
        }
    }
    for worktree in node.worktrees() {
        if filter.keeps(&worktree) {
            render_node(out, &worktree, home, filter, depth + 1, Some("worktree"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{render_forest, Filter};
    use reposcan::cache::forest_from_json;
    use reposcan::Forest;
    use std::path::Path;

    #[test]
    fn empty_forest_says_so() {
        let forest = Forest::default();
        assert_eq!(
            render_forest(&forest, Path::new("/home/dev"), Filter::All),
            "no repositories\n"
        );
    }

    fn sample_forest() -> Forest {
        forest_from_json(
            r#"{
                "repositories": {
                    "/home/dev/src/app": {
                        "working_directory": "/home/dev/src/app",
                        "current_branch": "main",
                        "has_pending_changes": true,
                        "number_of_pending_changes": 2,
                        "local_only_commits": true,
                        "submodules": {
                            "/home/dev/src/app/vendor": null,
                            "/home/dev/src/app/lib": {
                                "working_directory": "/home/dev/src/app/lib",
                                "current_branch": "(HEAD detached at abc1234)",
                                "is_detached_head": true
                            }
                        },
                        "worktrees": {
                            "/home/dev/src/app-feature": {
                                "working_directory": "/home/dev/src/app-feature",
                                "current_branch": "feature",
                                "is_worktree": true
                            }
                        }
                    }
                }
            }"#,
        )
        .expect("parse report")
    }

    #[test]
    fn renders_status_flags_and_children() {
        let forest = sample_forest();
        let rendered = render_forest(&forest, Path::new("/home/dev"), Filter::All);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "~/src/app  main  [2 changed, local commits]",
                "  submodule ~/src/app/lib  (HEAD detached at abc1234)  [detached]",
                "  submodule ~/src/app/vendor  (uninitialized)",
                "  worktree ~/src/app-feature  feature",
            ]
        );
    }

    #[test]
    fn pending_filter_keeps_dirty_nodes_and_their_parents() {
        let forest = forest_from_json(
            r#"{
                "repositories": {
                    "/src/clean": {
                        "working_directory": "/src/clean",
                        "current_branch": "main"
                    },
                    "/src/dirty": {
                        "working_directory": "/src/dirty",
                        "current_branch": "main",
                        "has_pending_changes": true,
                        "number_of_pending_changes": 1
                    },
                    "/src/parent": {
                        "working_directory": "/src/parent",
                        "current_branch": "main",
                        "submodules": {
                            "/src/parent/quiet": {
                                "working_directory": "/src/parent/quiet",
                                "current_branch": "main"
                            },
                            "/src/parent/vendor": null,
                            "/src/parent/wip": {
                                "working_directory": "/src/parent/wip",
                                "current_branch": "main",
                                "has_pending_changes": true,
                                "number_of_pending_changes": 4
                            }
                        }
                    }
                }
            }"#,
        )
        .expect("parse report");

        let rendered = render_forest(&forest, Path::new("/home/dev"), Filter::PendingChanges);
        assert_eq!(
            rendered.lines().collect::<Vec<_>>(),
            vec![
                "/src/dirty  main  [1 changed]",
                "/src/parent  main",
                "  submodule /src/parent/wip  main  [4 changed]",
            ]
        );

        let forest = sample_forest();
        let rendered = render_forest(&forest, Path::new("/home/dev"), Filter::PendingChanges);
        assert_eq!(rendered, "~/src/app  main  [2 changed, local commits]\n");
    }
}
