use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const CONFIG_KEY: &str = "config";
pub const DAILY_STATE_KEY: &str = "dailyState";

pub const DEFAULT_LIMIT: u32 = 3;

/// One group member as reported by a roster source.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub user_id: String,
    pub nickname: String,
}

impl RosterEntry {
    pub fn new(user_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            nickname: nickname.into(),
        }
    }
}

/// The member someone drew.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrawRecord {
    pub user_id: String,
    pub nickname: String,
}

impl From<&RosterEntry> for DrawRecord {
    fn from(entry: &RosterEntry) -> Self {
        Self {
            user_id: entry.user_id.clone(),
            nickname: entry.nickname.clone(),
        }
    }
}

/// A successful draw, with the drawer's count and the limit it was checked
/// against, both taken at the moment of the draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome {
    pub record: DrawRecord,
    pub count: u32,
    pub limit: u32,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserDrawState {
    pub count_today: u32,
    pub history: Vec<DrawRecord>,
}

impl UserDrawState {
    pub fn push(&mut self, record: DrawRecord) {
        self.history.push(record);
        self.count_today += 1;
    }
}

/// Everything that is wiped by the daily reset.
///
/// Tallies keep insertion order so that leaderboard ties resolve to whoever
/// was drawn first.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyState {
    pub users: HashMap<String, UserDrawState>,
    pub group_tallies: HashMap<String, IndexMap<String, u32>>,
}

impl DailyState {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.group_tallies.is_empty()
    }

    pub fn count_today(&self, user_id: &str) -> u32 {
        self.users.get(user_id).map_or(0, |user| user.count_today)
    }

    pub fn record(&mut self, user_id: &str, group_id: &str, record: DrawRecord) {
        *self
            .group_tallies
            .entry(group_id.to_string())
            .or_default()
            .entry(record.user_id.clone())
            .or_insert(0) += 1;

        self.users
            .entry(user_id.to_string())
            .or_default()
            .push(record);
    }

    /// Brings every `count_today` back in line with its history length.
    /// Returns the ids that needed fixing.
    pub fn repair_counts(&mut self) -> Vec<String> {
        let mut repaired = Vec::new();
        for (user_id, user) in self.users.iter_mut() {
            let len = user.history.len() as u32;
            if user.count_today != len {
                user.count_today = len;
                repaired.push(user_id.clone());
            }
        }
        repaired
    }
}

/// Per-group draw limits. Survives the daily reset.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaConfig {
    pub limits_by_group: HashMap<String, u32>,
}

impl QuotaConfig {
    pub fn limit(&self, group_id: &str, default: u32) -> u32 {
        self.limits_by_group
            .get(group_id)
            .copied()
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn daily_state_uses_persisted_layout() {
        let mut state = DailyState::default();
        state.record("u1", "g1", DrawRecord::from(&RosterEntry::new("t1", "Tee")));

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({
                "users": {"u1": {"countToday": 1, "history": [{"userId": "t1", "nickname": "Tee"}]}},
                "groupTallies": {"g1": {"t1": 1}},
            })
        );
    }

    #[test]
    fn quota_config_falls_back_to_default() {
        let config: QuotaConfig = serde_json::from_value(json!({"limitsByGroup": {"g": 5}})).unwrap();
        assert_eq!(config.limit("g", DEFAULT_LIMIT), 5);
        assert_eq!(config.limit("other", DEFAULT_LIMIT), 3);
    }

    #[test]
    fn repair_counts_trusts_history() {
        let mut state: DailyState = serde_json::from_value(json!({
            "users": {"u": {"countToday": 7, "history": [{"userId": "a", "nickname": "A"}]}},
            "groupTallies": {},
        }))
        .unwrap();

        assert_eq!(state.repair_counts(), vec!["u".to_string()]);
        assert_eq!(state.count_today("u"), 1);
        assert!(state.repair_counts().is_empty());
    }

    #[test]
    fn tally_keeps_first_drawn_order() {
        let mut state = DailyState::default();
        for target in ["b", "a", "b", "c"] {
            state.record("u", "g", DrawRecord::from(&RosterEntry::new(target, target)));
        }
        let order: Vec<&str> = state.group_tallies["g"].keys().map(String::as_str).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }
}
