use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("home directory not found")]
    HomeDirMissing,
    #[error("not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),
    #[error("no configured search path is a directory")]
    NoValidSearchPaths,
    #[error("failed to read {}: {source}", path.display())]
    Enumeration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration file {}: {source}", path.display())]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("git command failed: {command}\n{stderr}")]
    GitCommand { command: String, stderr: String },
    #[error("failed to inspect {}: {message}", path.display())]
    Inspection { path: PathBuf, message: String },
    #[error("observer callback {callback} failed: {message}")]
    Observer {
        callback: &'static str,
        message: String,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("progress updated before it was started")]
    ProgressNotStarted,
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
