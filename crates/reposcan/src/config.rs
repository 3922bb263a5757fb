use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::ContextOptions;
use crate::error::{Result, ScanError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub search_paths: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub ignored_paths: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl Configuration {
    pub fn default_for_platform() -> Self {
        let mut configuration = Self::default();
        if cfg!(windows) {
            configuration.search_paths.insert("%USERPROFILE%".to_string());
            configuration.ignored_paths.insert("%APPDATA%".to_string());
        } else {
            configuration.search_paths.insert("~".to_string());
        }
        configuration
    }

    /// Returns `None` only when the file does not exist. An unreadable or
    /// malformed file is an error so callers never overwrite it blindly.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| ScanError::InvalidConfig {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Falls back to the platform default when the file is missing; an
    /// unreadable or corrupt file is logged rather than fatal.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(configuration)) => configuration,
            Ok(None) => Self::default_for_platform(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load configuration; using defaults"
                );
                Self::default_for_platform()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut output = serde_json::to_string_pretty(self)?;
        output.push('\n');
        fs::write(path, output)?;
        Ok(())
    }

    pub fn add_search_path(&mut self, path: &str) -> bool {
        insert_trimmed(&mut self.search_paths, path)
    }

    pub fn add_ignored_path(&mut self, path: &str) -> bool {
        insert_trimmed(&mut self.ignored_paths, path)
    }

    pub fn remove_search_path(&mut self, path: &str) -> bool {
        self.search_paths.remove(path.trim())
    }

    pub fn remove_ignored_path(&mut self, path: &str) -> bool {
        self.ignored_paths.remove(path.trim())
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            max_concurrency: self.max_concurrency,
        }
    }
}

fn insert_trimmed(set: &mut BTreeSet<String>, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    set.insert(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::Configuration;

    #[test]
    fn default_configuration_searches_home() {
        let configuration = Configuration::default_for_platform();
        if cfg!(windows) {
            assert!(configuration.search_paths.contains("%USERPROFILE%"));
            assert!(configuration.ignored_paths.contains("%APPDATA%"));
        } else {
            assert!(configuration.search_paths.contains("~"));
            assert!(configuration.ignored_paths.is_empty());
        }
    }

    #[test]
    fn serialization_omits_empty_fields() {
        let mut configuration = Configuration::default();
        configuration.add_search_path("~/src");
        let json = serde_json::to_string(&configuration).expect("serialize");
        assert_eq!(json, r#"{"search_paths":["~/src"]}"#);

        let parsed: Configuration = serde_json::from_str("{}").expect("parse");
        assert_eq!(parsed, Configuration::default());
    }

    #[test]
    fn add_and_remove_paths_report_changes() {
        let mut configuration = Configuration::default();
        assert!(configuration.add_ignored_path(" /srv/big "));
        assert!(!configuration.add_ignored_path("/srv/big"));
        assert!(!configuration.add_ignored_path("   "));
        assert!(configuration.remove_ignored_path("/srv/big"));
        assert!(!configuration.remove_search_path("/missing"));
    }
}
