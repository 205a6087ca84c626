//! Periodic expiry reclamation.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::reservations::{ReclaimReport, ReservationManager};
use crate::store::InventoryStore;

/// Default interval between reclamation passes.
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

/// Config for the reclamation scheduler.
#[derive(Debug, Clone)]
pub struct ReclaimScheduler {
    pub interval: Duration,
}

impl Default for ReclaimScheduler {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECLAIM_INTERVAL,
        }
    }
}

/// Cumulative counters across passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub passes: u64,
    pub reclaimed: u64,
    pub failed: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl SchedulerStats {
    fn record(&mut self, report: &ReclaimReport, at: DateTime<Utc>) {
        self.passes += 1;
        self.reclaimed += report.reclaimed as u64;
        self.failed += report.failed as u64;
        self.last_run = Some(at);
    }
}

/// Handle for the running scheduler (trigger + shutdown).
#[derive(Debug)]
pub struct ReclaimSchedulerHandle {
    trigger: Arc<Notify>,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl ReclaimSchedulerHandle {
    /// Run a pass now instead of waiting for the next tick.
    ///
    /// Triggers coalesce: several calls while a pass is running yield one
    /// extra pass.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn stats(&self) -> SchedulerStats {
        lock_stats(&self.stats).clone()
    }

    /// Stop after the pass in flight, if any, completes.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "reclaim scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for ReclaimSchedulerHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl ReclaimScheduler {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the loop on the current tokio runtime. The first pass runs
    /// immediately.
    pub fn spawn<S>(self, manager: Arc<ReservationManager<S>>) -> ReclaimSchedulerHandle
    where
        S: InventoryStore + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let join = tokio::spawn(run_loop(
            manager,
            self.interval,
            trigger.clone(),
            shutdown_rx,
            stats.clone(),
        ));

        ReclaimSchedulerHandle {
            trigger,
            shutdown: Some(shutdown_tx),
            join: Some(join),
            stats,
        }
    }
}

async fn run_loop<S: InventoryStore>(
    manager: Arc<ReservationManager<S>>,
    interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: oneshot::Receiver<()>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs_f64(), "reclaim scheduler started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
            _ = trigger.notified() => debug!("reclaim pass triggered"),
        }

        let now = Utc::now();
        match manager.reclaim_expired(now).await {
            Ok(report) => lock_stats(&stats).record(&report, now),
            Err(e) => warn!(error = %e, "reclaim pass failed"),
        }
    }

    info!("reclaim scheduler stopped");
}

fn lock_stats(stats: &Mutex<SchedulerStats>) -> MutexGuard<'_, SchedulerStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    async fn wait_for_passes(handle: &ReclaimSchedulerHandle, passes: u64) {
        for _ in 0..200 {
            if handle.stats().passes >= passes {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scheduler did not reach {passes} passes: {:?}", handle.stats());
    }

    #[tokio::test]
    async fn first_pass_runs_immediately_and_trigger_forces_another() {
        let manager = Arc::new(ReservationManager::new(InMemoryStore::new()));
        let handle = ReclaimScheduler::with_interval(Duration::from_secs(3600)).spawn(manager);

        wait_for_passes(&handle, 1).await;
        assert!(handle.stats().last_run.is_some());

        handle.trigger();
        wait_for_passes(&handle, 2).await;
        assert_eq!(handle.stats().reclaimed, 0);

        handle.shutdown().await;
    }
}
