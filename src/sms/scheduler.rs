use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info, warn};

use crate::store::ClientStore;

/// Source of wall-clock time for boundary math.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Monthly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Monthly => "monthly",
        }
    }

    /// Start of the window containing `now`: local midnight, or the first of the month.
    pub fn window_start(&self, now: DateTime<Local>) -> DateTime<Local> {
        let today = now.date_naive();
        match self {
            Cadence::Daily => local_midnight(today),
            Cadence::Monthly => local_midnight(today.with_day(1).unwrap_or(today)),
        }
    }

    /// The next window start strictly after `now`.
    pub fn next_boundary(&self, now: DateTime<Local>) -> DateTime<Local> {
        let today = now.date_naive();
        let date = match self {
            Cadence::Daily => today.succ_opt().unwrap_or(NaiveDate::MAX),
            Cadence::Monthly => first_of_next_month(today),
        };
        local_midnight(date)
    }
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

// Midnight can fall in a DST gap; the earliest valid instant wins, else the UTC reading.
fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    let naive = date.and_time(NaiveTime::default());
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// key: usage-reset-scheduler -> daily and monthly counter resets
pub struct UsageResetScheduler {
    store: Arc<dyn ClientStore>,
    clock: Arc<dyn Clock>,
}

impl UsageResetScheduler {
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn ClientStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Starts the daily and monthly loops. They run until the handle is shut down.
    pub fn spawn(self) -> UsageResetHandle {
        let (shutdown, signal) = watch::channel(false);
        let scheduler = Arc::new(self);
        let tasks = [Cadence::Daily, Cadence::Monthly]
            .into_iter()
            .map(|cadence| {
                let scheduler = scheduler.clone();
                let signal = signal.clone();
                tokio::spawn(async move { scheduler.run(cadence, signal).await })
            })
            .collect();
        info!("usage reset scheduler started");
        UsageResetHandle { shutdown, tasks }
    }

    async fn run(&self, cadence: Cadence, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = self.clock.now();
            let boundary = cadence.next_boundary(now);
            let wait = (boundary - now).to_std().unwrap_or(TokioDuration::ZERO);
            debug!(cadence = cadence.as_str(), %boundary, "waiting for next usage reset");

            tokio::select! {
                _ = time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }

            // A timer that fires a hair early must still land in the new window.
            let at = self.clock.now().max(boundary);
            if let Err(err) = process_reset(self.store.as_ref(), cadence, at).await {
                warn!(?err, cadence = cadence.as_str(), "usage reset failed");
            }
        }
        debug!(cadence = cadence.as_str(), "usage reset loop stopped");
    }
}

/// Zeroes the cadence's counter for every client whose marker predates the window
/// containing `now`. Safe to repeat within a window.
pub async fn process_reset(
    store: &dyn ClientStore,
    cadence: Cadence,
    now: DateTime<Local>,
) -> Result<u64> {
    let window_start = cadence.window_start(now).with_timezone(&Utc);
    let now = now.with_timezone(&Utc);
    let affected = match cadence {
        Cadence::Daily => store.reset_daily_usage(window_start, now).await?,
        Cadence::Monthly => store.reset_monthly_usage(window_start, now).await?,
    };
    info!(cadence = cadence.as_str(), affected, "usage counters reset");
    Ok(affected)
}

pub struct UsageResetHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl UsageResetHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(?err, "usage reset task ended abnormally");
            }
        }
    }
}

pub mod testing {
    use super::*;
    use tokio::time::Instant;

    /// Wall clock pinned to `base` that advances with tokio's (pausable) timer.
    pub struct ManualClock {
        base: DateTime<Local>,
        started: Instant,
    }

    impl ManualClock {
        pub fn starting_at(base: DateTime<Local>) -> Self {
            Self {
                base,
                started: Instant::now(),
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            let elapsed = chrono::Duration::from_std(self.started.elapsed())
                .unwrap_or_else(|_| chrono::Duration::zero());
            self.base + elapsed
        }
    }
}
