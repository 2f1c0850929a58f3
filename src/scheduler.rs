//! Periodic counter resets and record cleanup.
//!
//! A single background task ticks once a minute and fires jobs on local
//! wall-clock edges: daily reset at midnight, monthly reset on the first,
//! an hourly stale-month check to cover down-time, and a weekly sweep of
//! old ranking records on Sunday at 02:00. Job failures are logged and
//! swallowed; the loop must outlive any individual error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike, Utc};
use log::{error, info};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::pool::SearchApiPool;
use crate::storage::RecordStore;

/// Day-of-week and hour of the weekly cleanup sweep.
const CLEANUP_WEEKDAY: chrono::Weekday = chrono::Weekday::Sun;
const CLEANUP_HOUR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    DailyReset,
    MonthlyReset,
    StaleCheck,
    Cleanup,
}

/// Tracks which wall-clock boundaries have been crossed since the last
/// tick. Each edge fires its job exactly once.
struct EdgeTracker {
    last_day: NaiveDate,
    last_month: (i32, u32),
    last_hour: (NaiveDate, u32),
    last_cleanup_day: Option<NaiveDate>,
}

impl EdgeTracker {
    fn new(now: DateTime<Local>) -> Self {
        EdgeTracker {
            last_day: now.date_naive(),
            last_month: (now.year(), now.month()),
            last_hour: (now.date_naive(), now.hour()),
            last_cleanup_day: None,
        }
    }

    fn observe(&mut self, now: DateTime<Local>) -> Vec<Job> {
        let mut jobs = Vec::new();
        let today = now.date_naive();

        if today != self.last_day {
            self.last_day = today;
            jobs.push(Job::DailyReset);
        }
        let month = (now.year(), now.month());
        if month != self.last_month {
            self.last_month = month;
            jobs.push(Job::MonthlyReset);
        }
        let hour = (today, now.hour());
        if hour != self.last_hour {
            self.last_hour = hour;
            jobs.push(Job::StaleCheck);
        }
        if now.weekday() == CLEANUP_WEEKDAY
            && now.hour() == CLEANUP_HOUR
            && self.last_cleanup_day != Some(today)
        {
            self.last_cleanup_day = Some(today);
            jobs.push(Job::Cleanup);
        }
        jobs
    }
}

/// Handle to the running scheduler task.
pub struct ResetScheduler {
    shutdown: CancellationToken,
}

impl ResetScheduler {
    /// Spawns the scheduler loop.
    pub fn start(pool: Arc<SearchApiPool>, records: RecordStore, retention_days: u32) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(60));
            let mut edges = EdgeTracker::new(Local::now());
            info!(
                "Reset scheduler started (cleanup retention: {retention_days} day(s))"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for job in edges.observe(Local::now()) {
                            run_job(job, &pool, &records, retention_days).await;
                        }
                    }
                    _ = token.cancelled() => {
                        info!("Reset scheduler shutting down");
                        break;
                    }
                }
            }
        });

        ResetScheduler { shutdown }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn run_job(
    job: Job,
    pool: &Arc<SearchApiPool>,
    records: &RecordStore,
    retention_days: u32,
) {
    match job {
        Job::DailyReset => {
            if let Err(e) = pool.reset_daily_all().await {
                error!("Daily reset failed: {e}");
            }
        }
        Job::MonthlyReset => {
            if let Err(e) = pool.reset_monthly_all().await {
                error!("Monthly reset failed: {e}");
            }
        }
        Job::StaleCheck => {
            if let Err(e) = pool.check_monthly_if_stale().await {
                error!("Stale-month check failed: {e}");
            }
        }
        Job::Cleanup => {
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
            match records.delete_older_than(cutoff).await {
                Ok(deleted) if deleted > 0 => {
                    info!("Cleanup removed {deleted} ranking record(s) older than {retention_days} day(s)")
                }
                Ok(_) => {}
                Err(e) => error!("Record cleanup failed: {e}"),
            }
        }
    }
}
