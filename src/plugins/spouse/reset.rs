//! Midnight reset of the daily draw state.
//!
//! The scheduler fires once per day at 23:59:59 local time. Missed resets
//! are not replayed: after a restart the next fire time is simply the next
//! 23:59:59 still ahead.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ledger::Ledger;
use super::roster::RosterCache;

const RESET_HOUR: u32 = 23;
const RESET_MINUTE: u32 = 59;
const RESET_SECOND: u32 = 59;

/// Wall-clock time and the ability to wait for it.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    async fn sleep_until(&self, deadline: DateTime<Local>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Local>) {
        let wait = (deadline - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
    }
}

/// Clock that stands still until something sleeps on it, then jumps
/// straight to the deadline. Lets tests run through days of resets instantly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep_until(&self, deadline: DateTime<Local>) {
        {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            if *now < deadline {
                *now = deadline;
            }
        }
        tokio::task::yield_now().await;
    }
}

/// The next 23:59:59 at or after `now`, in `now`'s time zone.
pub fn next_reset_after<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();

    // a day whose 23:59:59 falls into a DST gap is skipped
    for _ in 0..3 {
        let at = day
            .and_hms_opt(RESET_HOUR, RESET_MINUTE, RESET_SECOND)
            .and_then(|local| tz.from_local_datetime(&local).earliest());
        if let Some(at) = at.filter(|at| at >= now) {
            return at;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    now.clone() + TimeDelta::hours(24)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    Waiting(DateTime<Local>),
    Firing,
}

pub struct ResetScheduler<C> {
    clock: C,
    ledger: Ledger,
    roster: RosterCache,
    state: ResetState,
}

impl<C: Clock> ResetScheduler<C> {
    pub fn new(clock: C, ledger: Ledger, roster: RosterCache) -> Self {
        let next = next_reset_after(&clock.now());
        debug!(next = %next, "reset scheduled");
        Self {
            clock,
            ledger,
            roster,
            state: ResetState::Waiting(next),
        }
    }

    pub fn state(&self) -> ResetState {
        self.state
    }

    /// Waits for the next reset and performs it. Returns the instant that
    /// fired, or `None` if `shutdown` was cancelled first.
    ///
    /// Once the wait is over `shutdown` is no longer checked. A caller that
    /// drops the future while the reset is being written leaves the state at
    /// [`ResetState::Firing`], and the next call finishes that reset at once.
    pub async fn tick(&mut self, shutdown: &CancellationToken) -> Option<DateTime<Local>> {
        let at = match self.state {
            ResetState::Waiting(at) => {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        info!("reset scheduler stopped");
                        return None;
                    }
                    _ = self.clock.sleep_until(at) => at,
                }
            }
            // an interrupted reset is finished straight away
            ResetState::Firing => self.clock.now(),
        };

        self.state = ResetState::Firing;
        self.ledger.clear_daily().await;
        self.roster.invalidate_all().await;

        let next = at + TimeDelta::hours(24);
        self.state = ResetState::Waiting(next);
        info!(fired = %at, next = %next, "daily state reset");
        Some(at)
    }

    /// Resets every day until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        while self.tick(&shutdown).await.is_some() {}
    }
}
