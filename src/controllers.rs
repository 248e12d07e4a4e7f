//! Controllers shared between the page and code outside the UI.
//!
//! [`StatusController`] holds the status line ("help information") and lets
//! observers subscribe to changes. [`ProgressController`] runs the single
//! background operation and tracks whether it is busy.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::{debug, error};

use crate::error::BusyError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// Status line
// ─────────────────────────────────────────────────────────────────────────────

/// How the status line is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusStyle {
    #[default]
    Normal,
    Warning,
    Red,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusInfo {
    pub text: String,
    pub style: StatusStyle,
}

/// Controller for the page's status line.
#[derive(Clone, Default)]
pub struct StatusController {
    pub(crate) inner: Arc<Mutex<StatusCtrlInner>>,
}

#[derive(Default)]
pub(crate) struct StatusCtrlInner {
    pub(crate) current: StatusInfo,
    pub(crate) listeners: Vec<Sender<StatusInfo>>,
}

impl StatusController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the status text and notify subscribers.
    pub fn update_help_information(&self, text: &str, style: StatusStyle) {
        debug!("status: {text}");
        let mut inner = lock(&self.inner);
        inner.current = StatusInfo {
            text: text.to_string(),
            style,
        };
        let info = inner.current.clone();
        inner.listeners.retain(|s| s.send(info.clone()).is_ok());
    }

    pub fn current(&self) -> StatusInfo {
        lock(&self.inner).current.clone()
    }

    pub fn subscribe(&self) -> Receiver<StatusInfo> {
        let (tx, rx) = std::sync::mpsc::channel();
        lock(&self.inner).listeners.push(tx);
        rx
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background operation
// ─────────────────────────────────────────────────────────────────────────────

/// Runs at most one background operation at a time.
///
/// The busy flag is claimed before the worker starts and released when the
/// worker finishes (or panics), so a second request in between is rejected.
#[derive(Clone)]
pub struct ProgressController {
    pub(crate) inner: Arc<Mutex<ProgressInner>>,
    status: StatusController,
}

#[derive(Default)]
pub(crate) struct ProgressInner {
    pub(crate) running: Option<String>,
    pub(crate) completed: usize,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Releases the busy flag on drop.
struct BusyGuard {
    inner: Arc<Mutex<ProgressInner>>,
    status: StatusController,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let label = {
            let mut inner = lock(&self.inner);
            inner.completed += 1;
            inner.running.take()
        };
        if std::thread::panicking() {
            error!("background operation {:?} panicked", label);
            self.status
                .update_help_information("Background operation failed", StatusStyle::Red);
        } else if let Some(label) = label {
            self.status
                .update_help_information(&format!("Done: {label}"), StatusStyle::Normal);
        }
    }
}

impl ProgressController {
    pub fn new(status: StatusController) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressInner::default())),
            status,
        }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.inner).running.is_some()
    }

    /// Number of finished operations.
    pub fn completed(&self) -> usize {
        lock(&self.inner).completed
    }

    /// Start `job` on a worker thread. Rejected while another job runs.
    pub fn run<F>(&self, label: &str, job: F) -> Result<JoinHandle<()>, BusyError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.start(label, Box::new(job), |work| {
            std::thread::Builder::new()
                .name("qc-worker".to_string())
                .spawn(work)
        })
    }

    fn start(
        &self,
        label: &str,
        job: Job,
        spawn: impl FnOnce(Job) -> std::io::Result<JoinHandle<()>>,
    ) -> Result<JoinHandle<()>, BusyError> {
        {
            let mut inner = lock(&self.inner);
            if let Some(running) = &inner.running {
                return Err(BusyError {
                    running: running.clone(),
                });
            }
            inner.running = Some(label.to_string());
        }
        self.status
            .update_help_information(&format!("Running: {label}"), StatusStyle::Warning);
        // No guard unless the worker runs: a failed start is not a completion.
        let inner = self.inner.clone();
        let status = self.status.clone();
        let spawned = spawn(Box::new(move || {
            let _guard = BusyGuard { inner, status };
            job();
        }));
        spawned.map_err(|e| {
            error!("could not start worker: {e}");
            lock(&self.inner).running = None;
            self.status
                .update_help_information(&format!("Could not start: {label}"), StatusStyle::Red);
            BusyError {
                running: format!("worker start failed: {e}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn status_update_is_broadcast() {
        let status = StatusController::new();
        let rx = status.subscribe();
        status.update_help_information("Select a file", StatusStyle::Red);
        let info = rx.try_recv().unwrap();
        assert_eq!(info.text, "Select a file");
        assert_eq!(info.style, StatusStyle::Red);
        assert_eq!(status.current(), info);
    }

    #[test]
    fn second_run_is_rejected_while_busy() {
        let progress = ProgressController::new(StatusController::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = progress
            .run("batch", move || {
                let _ = release_rx.recv();
            })
            .unwrap();
        assert!(progress.is_busy());
        let err = progress.run("other", || {}).unwrap_err();
        assert_eq!(err.running, "batch");

        release_tx.send(()).unwrap();
        handle.join().unwrap();
        assert!(!progress.is_busy());
        assert_eq!(progress.completed(), 1);
        assert!(progress.run("again", || {}).unwrap().join().is_ok());
    }

    #[test]
    fn busy_flag_released_after_panic() {
        let progress = ProgressController::new(StatusController::new());
        let handle = progress.run("boom", || panic!("worker failure")).unwrap();
        assert!(handle.join().is_err());
        assert!(!progress.is_busy());
    }

    #[test]
    fn failed_start_is_not_counted_as_done() {
        let status = StatusController::new();
        let rx = status.subscribe();
        let progress = ProgressController::new(status);
        let err = progress
            .start("batch", Box::new(|| {}), |_| {
                Err(std::io::Error::other("no threads left"))
            })
            .unwrap_err();
        assert!(err.running.contains("no threads left"));
        assert!(!progress.is_busy());
        assert_eq!(progress.completed(), 0);

        let texts: Vec<String> = rx.try_iter().map(|i| i.text).collect();
        assert_eq!(texts, vec!["Running: batch", "Could not start: batch"]);
        assert!(progress.run("next", || {}).unwrap().join().is_ok());
        assert_eq!(progress.completed(), 1);
    }
}
