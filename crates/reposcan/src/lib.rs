pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod forest;
pub mod git;
pub mod inspector;
pub mod model;
pub mod paths;
pub mod progress;
pub mod refresh;
pub mod scanner;

pub use cache::{
    clear_cache, clear_default_cache, delete_default_local_files, delete_local_files,
    load_cached_forest, load_cached_paths, load_default_cached_paths, load_default_forest,
    save_cached_paths, save_default_cached_paths, save_default_forest, save_forest,
};
pub use config::Configuration;
pub use context::{CancelToken, ContextOptions, ScanContext};
pub use error::{Result, ScanError};
pub use events::{drain, ChannelSink, EventSink, LogSink, Notifier, NullSink, ScanEvent};
pub use forest::Forest;
pub use git::GitCli;
pub use inspector::{BranchDivergence, HeadState, RepositoryInspector, SubmoduleInfo};
pub use model::{RepositoryNode, RepositoryStatus, SubmoduleEntry};
pub use progress::ProgressTracker;
pub use refresh::RefreshEngine;
pub use scanner::PathScanner;
