use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::crawler::{CancelToken, FileCrawler, ProgressReporter, ScanConfig, ScanOutput, ScanProgress};

/// Notifications from a background scan, delivered in the order they happen.
///
/// A scan emits any number of `Progress` events followed by exactly one of the
/// other three.
#[derive(Debug)]
pub enum ScanEvent {
    Progress(ScanProgress),
    Finished(ScanOutput),
    Cancelled,
    Error(String),
}

impl ScanEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanEvent::Progress(_))
    }
}

fn scan_event_name(event: &ScanEvent) -> &'static str {
    match event {
        ScanEvent::Progress(_) => "progress",
        ScanEvent::Finished(_) => "finished",
        ScanEvent::Cancelled => "cancelled",
        ScanEvent::Error(_) => "error",
    }
}

/// One scan running on its own worker thread.
///
/// Dropping the handle requests cancellation but does not wait for the worker.
pub struct ScanHandle {
    root: PathBuf,
    cancel: CancelToken,
    events: Receiver<ScanEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ScanHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Request cancellation. Safe to call any number of times.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next pending event without blocking.
    pub fn try_next(&self) -> Option<ScanEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// All events currently queued.
    pub fn drain(&self) -> Vec<ScanEvent> {
        self.events.try_iter().collect()
    }

    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Block until the scan ends and return its terminal event, dropping progress.
    pub fn wait(mut self) -> Option<ScanEvent> {
        let terminal = self.events.iter().find(ScanEvent::is_terminal);
        self.join();
        terminal
    }

    /// Cancel, then block until the worker thread has exited. Returns the
    /// terminal event, which is `Finished` only if the scan beat the cancel.
    pub fn cancel_and_wait(mut self) -> Option<ScanEvent> {
        self.cancel();
        let terminal = self.events.iter().find(ScanEvent::is_terminal);
        self.join();
        terminal
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(root = %self.root.display(), "scan worker panicked");
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Spawn `crawler` over `root` on a worker thread, wired to `cancel`.
pub fn spawn_scan(crawler: Arc<FileCrawler>, root: PathBuf, cancel: CancelToken) -> ScanHandle {
    let (tx, rx) = mpsc::channel::<ScanEvent>();
    let worker_root = root.clone();
    let worker_cancel = cancel.clone();

    let worker = thread::spawn(move || {
        let progress_tx = tx.clone();
        let reporter: ProgressReporter = Arc::new(move |progress: ScanProgress| {
            let _ = progress_tx.send(ScanEvent::Progress(progress));
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            crawler.scan(&worker_root, &worker_cancel, Some(reporter))
        }));

        let event = match result {
            // A cancel that lands after the walk ended still wins over the result.
            Ok(Ok(_)) if worker_cancel.is_cancelled() => ScanEvent::Cancelled,
            Ok(Ok(output)) => ScanEvent::Finished(output),
            Ok(Err(err)) if err.is_cancelled() => ScanEvent::Cancelled,
            Ok(Err(err)) => ScanEvent::Error(err.to_string()),
            Err(_) => ScanEvent::Error("Scan thread panicked".to_string()),
        };

        let _ = tx.send(event);
    });

    ScanHandle {
        root,
        cancel,
        events: rx,
        worker: Some(worker),
    }
}

/// Owns at most one in-flight scan.
pub struct ScanController {
    crawler: Arc<FileCrawler>,
    active: Option<ScanHandle>,
}

impl ScanController {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            crawler: Arc::new(FileCrawler::new(config)),
            active: None,
        }
    }

    /// Start scanning `root`. A scan already in flight is cancelled and joined
    /// first, and its terminal event is returned.
    pub fn start_scan<P: AsRef<Path>>(&mut self, root: P) -> Option<ScanEvent> {
        let replaced = self.stop();
        self.active = Some(spawn_scan(
            Arc::clone(&self.crawler),
            root.as_ref().to_path_buf(),
            CancelToken::new(),
        ));
        replaced
    }

    /// Cancel the active scan and wait for its worker to exit.
    pub fn stop(&mut self) -> Option<ScanEvent> {
        let previous = self.active.take()?;
        debug!(root = %previous.root().display(), "stopping scan");
        let terminal = previous.cancel_and_wait();
        debug!(event = ?terminal.as_ref().map(scan_event_name), "scan stopped");
        terminal
    }

    pub fn cancel_scan(&self) {
        if let Some(handle) = self.active.as_ref() {
            handle.cancel();
        }
    }

    pub fn active(&self) -> Option<&ScanHandle> {
        self.active.as_ref()
    }

    pub fn is_scanning(&self) -> bool {
        self.active.is_some()
    }

    /// Drain pending events. Once the terminal event is seen the worker is joined
    /// and the controller goes idle.
    pub fn poll(&mut self) -> Vec<ScanEvent> {
        let Some(handle) = self.active.as_ref() else {
            return Vec::new();
        };

        let events = handle.drain();
        if events.iter().any(ScanEvent::is_terminal) {
            if let Some(mut done) = self.active.take() {
                done.join();
            }
        }
        events
    }

    /// Take the active scan out of the controller.
    pub fn take_active(&mut self) -> Option<ScanHandle> {
        self.active.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn populated_dir(files: usize) -> TempDir {
        let dir = TempDir::new().unwrap();
        for i in 0..files {
            fs::write(dir.path().join(format!("f{i}.bin")), vec![0u8; 8]).unwrap();
        }
        dir
    }

    fn no_snapshots() -> ScanConfig {
        ScanConfig {
            snapshot_interval_ms: None,
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_progress_precedes_finished() {
        let dir = populated_dir(20);
        let handle = spawn_scan(
            Arc::new(FileCrawler::new(no_snapshots())),
            dir.path().to_path_buf(),
            CancelToken::new(),
        );

        let events: Vec<ScanEvent> = handle.events().iter().collect();
        let (last, progress) = events.split_last().unwrap();
        assert!(progress.iter().all(|e| matches!(e, ScanEvent::Progress(_))));
        // Root plus every file.
        assert_eq!(progress.len(), 21);

        let ScanEvent::Finished(output) = last else {
            panic!("expected Finished, got {last:?}");
        };
        assert_eq!(output.tree.total_size(), 160);
        assert_eq!(output.stats.total_files, 20);
    }

    #[test]
    fn test_cancelled_scan_never_finishes() {
        let dir = populated_dir(50);
        let cancel = CancelToken::new();
        cancel.cancel();
        let handle = spawn_scan(
            Arc::new(FileCrawler::new(no_snapshots())),
            dir.path().to_path_buf(),
            cancel,
        );

        let events: Vec<ScanEvent> = handle.events().iter().collect();
        assert!(matches!(events.last(), Some(ScanEvent::Cancelled)));
        assert!(!events.iter().any(|e| matches!(e, ScanEvent::Finished(_))));
    }

    #[test]
    fn test_missing_root_reports_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let handle = spawn_scan(
            Arc::new(FileCrawler::new(no_snapshots())),
            missing.clone(),
            CancelToken::new(),
        );

        match handle.wait() {
            Some(ScanEvent::Error(message)) => assert!(message.contains("nope")),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_restart_stops_previous_scan() {
        let first = populated_dir(5000);
        let second = populated_dir(3);
        let mut controller = ScanController::new(no_snapshots());

        assert!(controller.start_scan(first.path()).is_none());
        // The replaced scan has already delivered its terminal event and exited.
        let replaced = controller.start_scan(second.path());
        assert!(matches!(replaced, Some(ScanEvent::Cancelled)), "got {replaced:?}");
        assert_eq!(controller.active().unwrap().root(), second.path());

        let handle = controller.take_active().unwrap();
        let Some(ScanEvent::Finished(output)) = handle.wait() else {
            panic!("second scan should finish");
        };
        assert_eq!(output.stats.total_files, 3);
        assert!(!controller.is_scanning());
    }

    #[test]
    fn test_stop_joins_and_goes_idle() {
        let dir = populated_dir(5000);
        let mut controller = ScanController::new(no_snapshots());
        assert!(controller.stop().is_none());

        controller.start_scan(dir.path());
        let stopped = controller.stop();
        assert!(matches!(stopped, Some(ScanEvent::Cancelled)), "got {stopped:?}");
        assert!(!controller.is_scanning());
        assert!(controller.poll().is_empty());
    }

    #[test]
    fn test_poll_goes_idle_after_terminal_event() {
        let dir = populated_dir(5);
        let mut controller = ScanController::new(no_snapshots());
        controller.start_scan(dir.path());

        let mut finished = false;
        for _ in 0..500 {
            let events = controller.poll();
            finished |= events.iter().any(|e| matches!(e, ScanEvent::Finished(_)));
            if !controller.is_scanning() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(finished);
        assert!(!controller.is_scanning());
        assert!(controller.poll().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let dir = populated_dir(2000);
        let mut controller = ScanController::new(no_snapshots());
        controller.start_scan(dir.path());
        controller.cancel_scan();
        controller.cancel_scan();

        let handle = controller.take_active().unwrap();
        assert!(handle.is_cancelled());
        assert!(matches!(handle.wait(), Some(ScanEvent::Cancelled)));
    }
}
