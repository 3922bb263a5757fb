use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use reposcan::{
    drain, ChannelSink, Configuration, Forest, ProgressTracker, RefreshEngine, ScanContext,
    ScanEvent,
};

const DRAIN_INTERVAL: Duration = Duration::from_millis(500);

/// Runs discovery and refresh on a background thread and reports its events
/// from this one, one batch per drain interval.
pub(crate) fn run_scan(
    configuration: Configuration,
    cached_paths: Option<Vec<PathBuf>>,
    verbose: bool,
) -> Result<Forest, Box<dyn std::error::Error>> {
    let (sink, rx) = ChannelSink::new();
    let handle = thread::spawn(move || -> reposcan::Result<Forest> {
        let ctx = ScanContext::with_git(&configuration.context_options())?;
        let engine = RefreshEngine::new(&ctx);
        let progress = ProgressTracker::new(&sink);
        Forest::generate(&configuration, &engine, cached_paths, &sink, &progress)
    });

    let reporter = Reporter { verbose };
    loop {
        let finished = handle.is_finished();
        reporter.report(drain(&rx));
        if finished {
            break;
        }
        thread::sleep(DRAIN_INTERVAL);
    }

    let forest = handle
        .join()
        .map_err(|_| "scan worker panicked".to_string())??;
    Ok(forest)
}

struct Reporter {
    verbose: bool,
}

impl Reporter {
    fn report(&self, events: Vec<ScanEvent>) {
        let mut latest_progress = None;
        for event in events {
            match event {
                ScanEvent::Message(message) if self.verbose => eprintln!("{message}"),
                ScanEvent::ProgressStarted { description, total } => {
                    eprintln!("{description} ({total})");
                }
                ScanEvent::ProgressUpdated { count, total } => {
                    latest_progress = Some((count, total));
                }
                _ => {}
            }
        }

        // Only the newest count in a batch is worth printing.
        if let Some((count, total)) = latest_progress {
            eprintln!("[{count}/{total}]");
        }
    }
}
