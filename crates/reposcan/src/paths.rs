use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CACHED_PATHS_FILE_NAME: &str = "repositories";
pub const REPORT_FILE_NAME: &str = "report.json";

pub fn cache_root() -> Result<PathBuf> {
    if let Some(root) = env::var_os("REPOSCAN_HOME") {
        if !root.is_empty() {
            return Ok(PathBuf::from(root));
        }
    }

    let home = dirs::home_dir().ok_or(ScanError::HomeDirMissing)?;
    Ok(home.join(".reposcan"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(cache_root()?.join(CONFIG_FILE_NAME))
}

pub fn cached_paths_path() -> Result<PathBuf> {
    Ok(cache_root()?.join(CACHED_PATHS_FILE_NAME))
}

pub fn report_path() -> Result<PathBuf> {
    Ok(cache_root()?.join(REPORT_FILE_NAME))
}

/// Expands `~`, `~/...`, `%VAR%`, `$VAR` and `${VAR}`. Unknown variables are
/// left untouched so the caller can report the literal path.
pub fn expand_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let expanded = expand_env_tokens(trimmed);

    if expanded == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    if let Some(rest) = expanded
        .strip_prefix("~/")
        .or_else(|| expanded.strip_prefix("~\\"))
    {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    PathBuf::from(expanded)
}

/// Expands, absolutizes and case-normalizes a configured path so it can be
/// compared against paths produced during traversal.
pub fn resolve_path(raw: &str) -> PathBuf {
    let path = expand_path(raw);
    let path = if path.is_absolute() {
        path
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path,
        }
    };
    normalize_path(&path)
}

/// Lower-cases paths on case-insensitive platforms so a path has exactly one
/// key form inside a forest.
pub fn normalize_path(path: &Path) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}

pub fn display_path_with_tilde(path: &Path, home: &Path) -> String {
    if path == home {
        return "~".to_string();
    }
    if let Ok(suffix) = path.strip_prefix(home) {
        let suffix = suffix.to_string_lossy();
        if suffix.is_empty() {
            "~".to_string()
        } else {
            format!("~/{}", suffix)
        }
    } else {
        path.display().to_string()
    }
}

fn expand_env_tokens(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(idx) = rest.find(|ch| ch == '%' || ch == '$') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        match expand_token(tail) {
            Some((replacement, consumed)) => {
                out.push_str(&replacement);
                rest = &tail[consumed..];
            }
            None => {
                // Keep the marker literally and continue after it.
                let marker_len = tail.chars().next().map(char::len_utf8).unwrap_or(1);
                out.push_str(&tail[..marker_len]);
                rest = &tail[marker_len..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn expand_token(tail: &str) -> Option<(String, usize)> {
    if let Some(inner) = tail.strip_prefix('%') {
        let end = inner.find('%')?;
        let name = &inner[..end];
        if !is_var_name(name) {
            return None;
        }
        let value = env::var(name).ok()?;
        return Some((value, end + 2));
    }

    let inner = tail.strip_prefix('$')?;
    if let Some(braced) = inner.strip_prefix('{') {
        let end = braced.find('}')?;
        let name = &braced[..end];
        if !is_var_name(name) {
            return None;
        }
        let value = env::var(name).ok()?;
        return Some((value, end + 3));
    }

    let len = inner
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(inner.len());
    let name = &inner[..len];
    if !is_var_name(name) {
        return None;
    }
    let value = env::var(name).ok()?;
    Some((value, len + 1))
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '(' || ch == ')')
}

#[cfg(test)]
mod tests {
    use super::{display_path_with_tilde, expand_env_tokens, expand_path};
    use std::path::{Path, PathBuf};

    #[test]
    fn expand_env_tokens_handles_all_styles() {
        std::env::set_var("REPOSCAN_PATHS_TEST_A", "/data");
        assert_eq!(expand_env_tokens("%REPOSCAN_PATHS_TEST_A%/src"), "/data/src");
        assert_eq!(expand_env_tokens("$REPOSCAN_PATHS_TEST_A/src"), "/data/src");
        assert_eq!(expand_env_tokens("${REPOSCAN_PATHS_TEST_A}/src"), "/data/src");
    }

    #[test]
    fn expand_env_tokens_keeps_unknown_variables() {
        std::env::remove_var("REPOSCAN_PATHS_TEST_MISSING");
        assert_eq!(
            expand_env_tokens("%REPOSCAN_PATHS_TEST_MISSING%/x"),
            "%REPOSCAN_PATHS_TEST_MISSING%/x"
        );
        assert_eq!(
            expand_env_tokens("$REPOSCAN_PATHS_TEST_MISSING/x"),
            "$REPOSCAN_PATHS_TEST_MISSING/x"
        );
        assert_eq!(expand_env_tokens("100% sure $"), "100% sure $");
    }

    #[test]
    fn expand_path_resolves_home_shorthand() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_path("~"), home);
        assert_eq!(expand_path("~/src"), home.join("src"));
        assert_eq!(expand_path("/opt/src"), PathBuf::from("/opt/src"));
    }

    #[test]
    fn display_path_with_tilde_shortens_home() {
        let home = Path::new("/home/dev");
        assert_eq!(display_path_with_tilde(Path::new("/home/dev"), home), "~");
        assert_eq!(
            display_path_with_tilde(Path::new("/home/dev/src/a"), home),
            "~/src/a"
        );
        assert_eq!(display_path_with_tilde(Path::new("/srv/a"), home), "/srv/a");
    }
}
