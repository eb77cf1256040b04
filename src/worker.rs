use std::fmt;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Run state of a background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Stopped,
    Running,
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopStatus::Stopped => f.write_str("stopped"),
            LoopStatus::Running => f.write_str("running"),
        }
    }
}

/// Lifecycle of one background task
///
/// `Running` owns the stop signal and the join handle, so a loop can only be
/// stopped by whoever started it.
#[derive(Debug, Default)]
pub enum LoopState {
    #[default]
    Stopped,
    Running {
        stop: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
}

impl LoopState {
    /// Whether a task was started and has not finished on its own
    pub fn status(&self) -> LoopStatus {
        match self {
            LoopState::Running { handle, .. } if !handle.is_finished() => LoopStatus::Running,
            _ => LoopStatus::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == LoopStatus::Running
    }

    /// Spawn the loop body with a fresh stop receiver
    pub fn spawn<F, Fut>(&mut self, body: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(body(stop_rx));
        *self = LoopState::Running { stop, handle };
    }

    /// Signal the task and wait for it to finish
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&mut self) -> bool {
        match std::mem::take(self) {
            LoopState::Stopped => false,
            LoopState::Running { stop, handle } => {
                let _ = stop.send(true);
                if let Err(e) = handle.await {
                    tracing::warn!("Background task ended abnormally: {}", e);
                }
                true
            }
        }
    }
}

/// Resolve once the stop flag is raised or its sender is gone
pub async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_and_stop() {
        let mut state = LoopState::default();
        assert_eq!(state.status(), LoopStatus::Stopped);

        state.spawn(|mut stop| async move {
            stopped(&mut stop).await;
        });
        assert!(state.is_running());

        assert!(state.stop().await);
        assert_eq!(state.status(), LoopStatus::Stopped);
        assert!(!state.stop().await);
    }

    #[tokio::test]
    async fn test_finished_task_reports_stopped() {
        let mut state = LoopState::default();
        state.spawn(|_stop| async {});

        for _ in 0..50 {
            if !state.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(state.status(), LoopStatus::Stopped);
        assert!(state.stop().await);
    }
}
