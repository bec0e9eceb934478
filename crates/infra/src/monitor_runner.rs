//! Background polling loop for the Inventory Monitor.
//!
//! - Schedule: polls every `interval`, keeping a stable cadence.
//! - Event trigger: [`MonitorHandle::trigger`] requests an immediate poll.
//!   Triggers are coalesced through a capacity-1 channel.
//! - Failures: logged and retried with bounded exponential backoff; they
//!   never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Counts from one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub products_checked: usize,
    pub breaches: usize,
    pub recoveries: usize,
    pub errors: usize,
}

/// Something the runner can poll.
#[async_trait]
pub trait PollTarget: Send + Sync + 'static {
    async fn poll_once(&self) -> Result<PollReport, EngineError>;
}

#[derive(Debug, Clone)]
pub struct MonitorRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for MonitorRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
        }
    }
}

impl MonitorRunner {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Spawn the loop on the current tokio runtime. Polls once on startup.
    pub fn spawn<T: PollTarget>(&self, target: Arc<T>) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let cfg = self.clone();
        let join = tokio::spawn(runner_loop(cfg, target, shutdown_rx, trigger_rx));

        MonitorHandle {
            shutdown: Some(shutdown_tx),
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    trigger: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Request a poll now. A no-op when one is already pending.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the loop and wait for the in-flight poll to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

async fn runner_loop<T: PollTarget>(
    cfg: MonitorRunner,
    target: Arc<T>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
) {
    info!(interval_secs = cfg.interval.as_secs(), "inventory monitor started");

    let mut ticker = tokio::time::interval_at(Instant::now() + cfg.interval, cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;
    let mut pending = true;

    loop {
        if pending {
            pending = false;
            match target.poll_once().await {
                Ok(report) => {
                    failures = 0;
                    debug!(
                        products = report.products_checked,
                        breaches = report.breaches,
                        recoveries = report.recoveries,
                        errors = report.errors,
                        "monitor poll finished"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "monitor poll failed");
                    failures += 1;
                    if failures <= cfg.max_retries {
                        let delay = backoff(cfg.base_backoff, failures);
                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        pending = true;
                        continue;
                    }
                    // Give up until the next tick.
                    failures = 0;
                }
            }
        }

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => pending = true,
            Some(()) = trigger_rx.recv() => pending = true,
        }
    }

    info!("inventory monitor stopped");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        polls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl PollTarget for Counter {
        async fn poll_once(&self) -> Result<PollReport, EngineError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(EngineError::Collaborator(
                    crate::collaborators::CollaboratorError::Unavailable("down".into()),
                ));
            }
            Ok(PollReport::default())
        }
    }

    async fn wait_for(counter: &Counter, at_least: usize) {
        for _ in 0..200 {
            if counter.polls.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected at least {at_least} polls");
    }

    #[tokio::test]
    async fn polls_on_startup_and_on_trigger() {
        let counter = Arc::new(Counter::default());
        let handle = MonitorRunner::new(Duration::from_secs(60)).spawn(Arc::clone(&counter));

        wait_for(&counter, 1).await;
        handle.trigger();
        wait_for(&counter, 2).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn failures_are_retried_with_backoff() {
        let counter = Arc::new(Counter {
            fail_first: 2,
            ..Counter::default()
        });
        let runner = MonitorRunner {
            interval: Duration::from_secs(60),
            max_retries: 5,
            base_backoff: Duration::from_millis(1),
        };
        let handle = runner.spawn(Arc::clone(&counter));

        wait_for(&counter, 3).await;
        handle.shutdown().await;
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff(Duration::from_millis(250), 1), Duration::from_millis(250));
        assert_eq!(backoff(Duration::from_millis(250), 3), Duration::from_millis(1000));
        assert_eq!(backoff(Duration::from_millis(250), 30), Duration::from_millis(10_000));
    }
}
