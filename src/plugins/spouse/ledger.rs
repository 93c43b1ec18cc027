//! Daily draw quotas, draw history and per-group tallies.
//!
//! Every mutating operation runs under one lock, so the quota check and the
//! write it guards can never interleave with another draw, a limit change or
//! the daily reset. The daily state is written to the store before the lock
//! is released.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::data::{
    DailyState, DrawOutcome, DrawRecord, QuotaConfig, RosterEntry, CONFIG_KEY, DAILY_STATE_KEY, DEFAULT_LIMIT,
};
use crate::error::DrawError;
use crate::store::{load_or_default, save, MemoryStore, SharedStore};
use crate::SharedState;

#[derive(Debug, Default)]
struct LedgerState {
    daily: DailyState,
    quota: QuotaConfig,
}

#[derive(Clone)]
pub struct Ledger {
    state: SharedState<LedgerState>,
    store: SharedStore,
    default_limit: u32,
}

impl Ledger {
    /// Loads both persisted records from `store`.
    pub async fn load(store: SharedStore, default_limit: u32) -> Self {
        let mut daily: DailyState = load_or_default(&*store, DAILY_STATE_KEY).await;
        let quota: QuotaConfig = load_or_default(&*store, CONFIG_KEY).await;

        for user in daily.repair_counts() {
            warn!(user = %user, "draw count disagreed with history, repaired");
        }
        debug!(
            users = daily.users.len(),
            groups = quota.limits_by_group.len(),
            "ledger loaded"
        );

        Self {
            state: Arc::new(Mutex::new(LedgerState { daily, quota })),
            store,
            default_limit,
        }
    }

    /// Empty ledger over a fresh [`MemoryStore`] with the default limit.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::default(),
            store: Arc::new(MemoryStore::new()),
            default_limit: DEFAULT_LIMIT,
        }
    }

    /// Draws one of `candidates` for `user_id`, uniformly at random.
    ///
    /// Rejected draws leave the ledger untouched.
    pub async fn try_draw(
        &self,
        user_id: &str,
        group_id: &str,
        candidates: &[RosterEntry],
    ) -> Result<DrawOutcome, DrawError> {
        let mut state = self.state.lock().await;

        let limit = state.quota.limit(group_id, self.default_limit);
        let count = state.daily.count_today(user_id);
        if count >= limit {
            debug!(user = user_id, group = group_id, count, limit, "draw rejected");
            return Err(DrawError::QuotaExceeded { limit });
        }

        let record = candidates
            .choose(&mut rand::thread_rng())
            .map(DrawRecord::from)
            .ok_or(DrawError::NoCandidates)?;

        state.daily.record(user_id, group_id, record.clone());
        info!(
            user = user_id,
            group = group_id,
            drawn = %record.user_id,
            count = count + 1,
            limit,
            "draw accepted"
        );

        self.persist_daily(&state.daily).await;
        Ok(DrawOutcome {
            record,
            count: count + 1,
            limit,
        })
    }

    /// Fails with `QuotaExceeded` when `user_id` has no draws left in
    /// `group_id`, otherwise returns how many remain.
    pub async fn check_quota(&self, user_id: &str, group_id: &str) -> Result<u32, DrawError> {
        let state = self.state.lock().await;
        let limit = state.quota.limit(group_id, self.default_limit);
        let count = state.daily.count_today(user_id);
        if count >= limit {
            Err(DrawError::QuotaExceeded { limit })
        } else {
            Ok(limit - count)
        }
    }

    pub async fn count_today(&self, user_id: &str) -> u32 {
        self.state.lock().await.daily.count_today(user_id)
    }

    pub async fn history(&self, user_id: &str) -> Vec<DrawRecord> {
        self.state
            .lock()
            .await
            .daily
            .users
            .get(user_id)
            .map(|user| user.history.clone())
            .unwrap_or_default()
    }

    /// Most drawn members of `group_id`, highest count first. Equal counts
    /// keep the order in which the members were first drawn.
    pub async fn leaderboard(&self, group_id: &str, top_n: usize) -> Vec<(String, u32)> {
        let state = self.state.lock().await;
        let Some(tally) = state.daily.group_tallies.get(group_id) else {
            return Vec::new();
        };

        let mut ranked: Vec<(String, u32)> = tally
            .iter()
            .map(|(user_id, count)| (user_id.clone(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(top_n);
        ranked
    }

    pub async fn limit(&self, group_id: &str) -> u32 {
        self.state
            .lock()
            .await
            .quota
            .limit(group_id, self.default_limit)
    }

    pub async fn set_limit(&self, group_id: &str, limit: u32) {
        let mut state = self.state.lock().await;
        state.quota.limits_by_group.insert(group_id.to_string(), limit);
        info!(group = group_id, limit, "draw limit changed");

        if let Err(e) = save(&*self.store, CONFIG_KEY, &state.quota).await {
            warn!(group = group_id, error = %e, "failed to persist quota config");
        }
    }

    /// Drops every user's draws and every group tally, then persists the
    /// empty state.
    pub async fn clear_daily(&self) {
        let mut state = self.state.lock().await;
        state.daily = DailyState::default();
        self.persist_daily(&state.daily).await;
    }

    pub async fn daily_snapshot(&self) -> DailyState {
        self.state.lock().await.daily.clone()
    }

    // in-memory state stays authoritative when the write fails
    async fn persist_daily(&self, daily: &DailyState) {
        if let Err(e) = save(&*self.store, DAILY_STATE_KEY, daily).await {
            warn!(error = %e, "failed to persist daily state");
        }
    }
}
