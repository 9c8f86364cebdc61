//! Cancellable interval scheduler. Jobs run on their own period; stopping
//! signals every loop through a watch channel and joins each task with a
//! bounded timeout, aborting stragglers so shutdown never hangs on an
//! in-flight tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::interfaces::scheduler::ScheduledJob;

pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    handles: Vec<JoinHandle<()>>,
    stop: Option<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            handles: Vec::new(),
            stop: None,
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        self.jobs.push(job);
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }

    pub fn start(&mut self) {
        if self.stop.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        self.stop = Some(tx);

        for job in &self.jobs {
            let job = Arc::clone(job);
            let mut tick = tokio::time::interval(job.interval());
            let mut rx = rx.clone();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Err(err) = job.run().await {
                                tracing::error!(job = job.name(), error = %err, "scheduled job tick failed");
                            }
                        }
                        _ = rx.changed() => {
                            if *rx.borrow() {
                                tracing::debug!(job = job.name(), "scheduled job stopping");
                                break;
                            }
                        }
                    }
                }
            });
            self.handles.push(handle);
        }
    }

    /// Signals every job loop to stop and waits up to `grace` for each one.
    /// A tick that outlives the grace period is aborted rather than orphaned.
    pub async fn stop(&mut self, grace: Duration) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(true);
        }
        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                abort.abort();
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

pub fn seconds(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn scheduler_ticks_and_stops_cleanly() {
        let job = Arc::new(CountingJob {
            ticks: AtomicUsize::new(0),
        });
        let mut scheduler = Scheduler::new();
        scheduler.register_job(job.clone());

        scheduler.start();
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.stop(Duration::from_secs(1)).await;
        assert!(!scheduler.is_running());

        let observed = job.ticks.load(Ordering::SeqCst);
        assert!(observed >= 2, "expected several ticks, saw {observed}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(
            job.ticks.load(Ordering::SeqCst),
            observed,
            "no ticks after stop"
        );
    }

    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let job = Arc::new(CountingJob {
            ticks: AtomicUsize::new(0),
        });
        let mut scheduler = Scheduler::new();
        scheduler.register_job(job);
        scheduler.start();
        scheduler.start();
        scheduler.stop(Duration::from_secs(1)).await;
    }
}
