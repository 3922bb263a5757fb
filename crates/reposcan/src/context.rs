use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::Span;

use crate::error::Result;
use crate::git::GitCli;
use crate::inspector::RepositoryInspector;

/// Shared flag checked at every directory, node, submodule and worktree.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Worker thread ceiling; `None` uses the available parallelism.
    pub max_concurrency: Option<usize>,
}

/// Everything a scan or refresh needs, built once per run and passed by
/// reference: the inspector, the bounded worker pool, the cancellation flag
/// and the span every worker task logs under.
pub struct ScanContext {
    inspector: Arc<dyn RepositoryInspector>,
    pool: ThreadPool,
    cancel: CancelToken,
    span: Span,
}

impl ScanContext {
    pub fn new(inspector: Arc<dyn RepositoryInspector>, options: &ContextOptions) -> Result<Self> {
        let threads = options
            .max_concurrency
            .filter(|count| *count > 0)
            .unwrap_or_else(default_concurrency);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("reposcan-worker-{index}"))
            .build()?;

        Ok(Self {
            inspector,
            pool,
            cancel: CancelToken::new(),
            span: tracing::info_span!("reposcan", threads),
        })
    }

    pub fn with_git(options: &ContextOptions) -> Result<Self> {
        Self::new(Arc::new(GitCli::new()), options)
    }

    pub fn inspector(&self) -> &dyn RepositoryInspector {
        self.inspector.as_ref()
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, ContextOptions, ScanContext};

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn context_respects_concurrency_ceiling() {
        let options = ContextOptions {
            max_concurrency: Some(3),
        };
        let ctx = ScanContext::with_git(&options).expect("context");
        assert_eq!(ctx.threads(), 3);
    }

    #[test]
    fn zero_concurrency_falls_back_to_default() {
        let options = ContextOptions {
            max_concurrency: Some(0),
        };
        let ctx = ScanContext::with_git(&options).expect("context");
        assert!(ctx.threads() >= 1);
    }
}
