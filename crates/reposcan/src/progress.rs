use std::sync::{Mutex, PoisonError};

use crate::error::{Result, ScanError};
use crate::events::{log_observer_failure, EventSink, Notifier};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counter {
    count: usize,
    total: usize,
}

/// Counts finished units of work and reports them through the event sink.
///
/// Updates are applied and reported under one lock, so observers see counts
/// in increasing order even when many workers advance concurrently.
pub struct ProgressTracker<'a> {
    notifier: Notifier<'a>,
    state: Mutex<Option<Counter>>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            notifier: Notifier::new(sink),
            state: Mutex::new(None),
        }
    }

    pub fn start(&self, description: &str, total: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = Some(Counter { count: 0, total });
        log_observer_failure(self.notifier.progress_started(description, total));
    }

    pub fn update(&self, count: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = state.as_mut().ok_or(ScanError::ProgressNotStarted)?;
        counter.count = count;
        log_observer_failure(self.notifier.progress_updated(counter.count, counter.total));
        Ok(())
    }

    pub fn advance(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = state.as_mut().ok_or(ScanError::ProgressNotStarted)?;
        counter.count += 1;
        log_observer_failure(self.notifier.progress_updated(counter.count, counter.total));
        Ok(())
    }

    /// Jumps to the total for work that will never run, e.g. roots left
    /// unqueued after cancellation. Does nothing once the total is reached.
    pub fn finish(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = state.as_mut().ok_or(ScanError::ProgressNotStarted)?;
        if counter.count < counter.total {
            counter.count = counter.total;
            log_observer_failure(self.notifier.progress_updated(counter.count, counter.total));
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.counter().map(|counter| counter.count).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counter().map(|counter| counter.total).unwrap_or(0)
    }

    pub fn fraction(&self) -> f64 {
        match self.counter() {
            Some(Counter { total: 0, .. }) => 1.0,
            Some(Counter { count, total }) => count as f64 / total as f64,
            None => 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.counter()
            .is_some_and(|counter| counter.count >= counter.total)
    }

    fn counter(&self) -> Option<Counter> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::ProgressTracker;
    use crate::error::ScanError;
    use crate::events::{drain, ChannelSink, NullSink, ScanEvent};

    #[test]
    fn update_before_start_fails() {
        let sink = NullSink;
        let progress = ProgressTracker::new(&sink);
        assert!(matches!(progress.update(1), Err(ScanError::ProgressNotStarted)));
        assert!(matches!(progress.advance(), Err(ScanError::ProgressNotStarted)));
        assert!(matches!(progress.finish(), Err(ScanError::ProgressNotStarted)));
        assert!(!progress.is_finished());
    }

    #[test]
    fn start_resets_and_reports() {
        let (sink, rx) = ChannelSink::new();
        let progress = ProgressTracker::new(&sink);

        progress.start("Refreshing", 4);
        progress.update(3).expect("update");
        progress.start("Refreshing again", 2);
        assert_eq!(progress.count(), 0);
        progress.advance().expect("advance");
        progress.advance().expect("advance");

        assert!(progress.is_finished());
        assert_eq!(progress.fraction(), 1.0);

        let events = drain(&rx);
        assert!(matches!(
            &events[0],
            ScanEvent::ProgressStarted { description, total: 4 } if description == "Refreshing"
        ));
        assert!(matches!(events[1], ScanEvent::ProgressUpdated { count: 3, total: 4 }));
        assert!(matches!(events[2], ScanEvent::ProgressStarted { total: 2, .. }));
        assert!(matches!(events[4], ScanEvent::ProgressUpdated { count: 2, total: 2 }));
    }

    #[test]
    fn finish_jumps_to_total_once() {
        let (sink, rx) = ChannelSink::new();
        let progress = ProgressTracker::new(&sink);
        progress.start("Refreshing", 3);
        progress.advance().expect("advance");

        progress.finish().expect("finish");
        progress.finish().expect("finish again");

        assert_eq!(progress.count(), 3);
        assert!(progress.is_finished());
        let events = drain(&rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], ScanEvent::ProgressUpdated { count: 3, total: 3 }));
    }

    #[test]
    fn empty_work_counts_as_finished() {
        let sink = NullSink;
        let progress = ProgressTracker::new(&sink);
        progress.start("Nothing to do", 0);
        assert!(progress.is_finished());
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn concurrent_advances_reach_total() {
        let sink = NullSink;
        let progress = ProgressTracker::new(&sink);
        progress.start("Parallel", 64);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..8 {
                        progress.advance().expect("advance");
                    }
                });
            }
        });

        assert_eq!(progress.count(), 64);
        assert!(progress.is_finished());
    }
}
