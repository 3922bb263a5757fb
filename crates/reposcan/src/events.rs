//! Observer surface shared by the scanner and the refresh engine.
//!
//! Sinks are called from many worker threads at once. The simplest correct
//! sink is [`ChannelSink`], which only enqueues; the consumer drains the
//! queue on its own thread at a fixed interval.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::model::RepositoryNode;

pub trait EventSink: Send + Sync {
    fn send_message(&self, message: &str);

    fn repository_created(&self, node: &Arc<RepositoryNode>);

    fn submodule_created(&self, parent: &Arc<RepositoryNode>, child: &Arc<RepositoryNode>);

    fn worktree_created(&self, node: &Arc<RepositoryNode>);

    fn uninitialized_submodule_created(&self, parent: &Arc<RepositoryNode>, path: &Path);

    fn refresh_completed(&self, node: &Arc<RepositoryNode>);

    fn progress_started(&self, _description: &str, _total: usize) {}

    fn progress_updated(&self, _count: usize, _total: usize) {}
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Message(String),
    RepositoryCreated(Arc<RepositoryNode>),
    SubmoduleCreated {
        parent: Arc<RepositoryNode>,
        child: Arc<RepositoryNode>,
    },
    WorktreeCreated(Arc<RepositoryNode>),
    UninitializedSubmoduleCreated {
        parent: Arc<RepositoryNode>,
        path: PathBuf,
    },
    RefreshCompleted(Arc<RepositoryNode>),
    ProgressStarted {
        description: String,
        total: usize,
    },
    ProgressUpdated {
        count: usize,
        total: usize,
    },
}

/// Enqueues every callback as a [`ScanEvent`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ScanEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn push(&self, event: ScanEvent) {
        // The receiver going away just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Collects everything currently queued without blocking.
pub fn drain(rx: &mpsc::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

impl EventSink for ChannelSink {
    fn send_message(&self, message: &str) {
        self.push(ScanEvent::Message(message.to_string()));
    }

    fn repository_created(&self, node: &Arc<RepositoryNode>) {
        self.push(ScanEvent::RepositoryCreated(Arc::clone(node)));
    }

    fn submodule_created(&self, parent: &Arc<RepositoryNode>, child: &Arc<RepositoryNode>) {
        self.push(ScanEvent::SubmoduleCreated {
            parent: Arc::clone(parent),
            child: Arc::clone(child),
        });
    }

    fn worktree_created(&self, node: &Arc<RepositoryNode>) {
        self.push(ScanEvent::WorktreeCreated(Arc::clone(node)));
    }

    fn uninitialized_submodule_created(&self, parent: &Arc<RepositoryNode>, path: &Path) {
        self.push(ScanEvent::UninitializedSubmoduleCreated {
            parent: Arc::clone(parent),
            path: path.to_path_buf(),
        });
    }

    fn refresh_completed(&self, node: &Arc<RepositoryNode>) {
        self.push(ScanEvent::RefreshCompleted(Arc::clone(node)));
    }

    fn progress_started(&self, description: &str, total: usize) {
        self.push(ScanEvent::ProgressStarted {
            description: description.to_string(),
            total,
        });
    }

    fn progress_updated(&self, count: usize, total: usize) {
        self.push(ScanEvent::ProgressUpdated { count, total });
    }
}

/// Forwards every callback to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn send_message(&self, message: &str) {
        debug!("{message}");
    }

    fn repository_created(&self, node: &Arc<RepositoryNode>) {
        debug!(path = %node.working_directory().display(), "repository created");
    }

    fn submodule_created(&self, parent: &Arc<RepositoryNode>, child: &Arc<RepositoryNode>) {
        debug!(
            parent = %parent.working_directory().display(),
            path = %child.working_directory().display(),
            "submodule created"
        );
    }

    fn worktree_created(&self, node: &Arc<RepositoryNode>) {
        debug!(path = %node.working_directory().display(), "worktree created");
    }

    fn uninitialized_submodule_created(&self, parent: &Arc<RepositoryNode>, path: &Path) {
        debug!(
            parent = %parent.working_directory().display(),
            path = %path.display(),
            "uninitialized submodule"
        );
    }

    fn refresh_completed(&self, node: &Arc<RepositoryNode>) {
        debug!(path = %node.working_directory().display(), "refresh completed");
    }

    fn progress_started(&self, description: &str, total: usize) {
        info!(total, "{description}");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn send_message(&self, _message: &str) {}
    fn repository_created(&self, _node: &Arc<RepositoryNode>) {}
    fn submodule_created(&self, _parent: &Arc<RepositoryNode>, _child: &Arc<RepositoryNode>) {}
    fn worktree_created(&self, _node: &Arc<RepositoryNode>) {}
    fn uninitialized_submodule_created(&self, _parent: &Arc<RepositoryNode>, _path: &Path) {}
    fn refresh_completed(&self, _node: &Arc<RepositoryNode>) {}
}

/// Calls into an [`EventSink`] with panics contained. Each method reports an
/// observer failure as `Err` instead of unwinding into scan code.
#[derive(Clone, Copy)]
pub struct Notifier<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> Notifier<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }

    pub fn send_message(&self, message: &str) -> Result<()> {
        guard("send_message", || self.sink.send_message(message))
    }

    pub fn repository_created(&self, node: &Arc<RepositoryNode>) -> Result<()> {
        guard("repository_created", || self.sink.repository_created(node))
    }

    pub fn submodule_created(
        &self,
        parent: &Arc<RepositoryNode>,
        child: &Arc<RepositoryNode>,
    ) -> Result<()> {
        guard("submodule_created", || {
            self.sink.submodule_created(parent, child)
        })
    }

    pub fn worktree_created(&self, node: &Arc<RepositoryNode>) -> Result<()> {
        guard("worktree_created", || self.sink.worktree_created(node))
    }

    pub fn uninitialized_submodule_created(
        &self,
        parent: &Arc<RepositoryNode>,
        path: &Path,
    ) -> Result<()> {
        guard("uninitialized_submodule_created", || {
            self.sink.uninitialized_submodule_created(parent, path)
        })
    }

    pub fn refresh_completed(&self, node: &Arc<RepositoryNode>) -> Result<()> {
        guard("refresh_completed", || self.sink.refresh_completed(node))
    }

    pub fn progress_started(&self, description: &str, total: usize) -> Result<()> {
        guard("progress_started", || {
            self.sink.progress_started(description, total)
        })
    }

    pub fn progress_updated(&self, count: usize, total: usize) -> Result<()> {
        guard("progress_updated", || self.sink.progress_updated(count, total))
    }
}

fn guard(callback: &'static str, call: impl FnOnce()) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| ScanError::Observer {
        callback,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "observer panicked".to_string()
    }
}

/// Logs an observer failure; the caller keeps going either way.
pub fn log_observer_failure(result: Result<()>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "event sink callback failed");
    }
}
