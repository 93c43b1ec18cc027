//! Group member lists: where they come from and how long they are reused.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::data::RosterEntry;
use crate::error::FetchError;
use crate::SharedState;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A platform that can list the members of a group.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_members(&self, group_id: &str) -> Result<Vec<RosterEntry>, FetchError>;

    /// Avatar image for a member, when the platform has a public one.
    fn avatar_url(&self, _user_id: &str) -> Option<String> {
        None
    }
}

/// Fixed member lists, usually taken from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    groups: HashMap<String, Vec<RosterEntry>>,
}

impl StaticRoster {
    pub fn new(groups: HashMap<String, Vec<RosterEntry>>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl RosterSource for StaticRoster {
    async fn fetch_members(&self, group_id: &str) -> Result<Vec<RosterEntry>, FetchError> {
        self.groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| FetchError::UnknownGroup(group_id.to_string()))
    }
}

/// OneBot v11 HTTP API (NapCat, go-cqhttp and friends).
#[derive(Debug, Clone)]
pub struct OneBotRoster {
    client: Client,
    member_list_url: String,
    access_token: Option<String>,
}

impl OneBotRoster {
    pub fn new(endpoint: impl Into<String>, access_token: Option<String>) -> Self {
        let endpoint = endpoint.into();
        let base = endpoint.trim_end_matches('/');
        Self {
            client: Client::new(),
            member_list_url: format!("{base}/get_group_member_list"),
            access_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    status: String,
    retcode: i64,
    #[serde(default)]
    data: Option<Vec<MemberInfo>>,
}

#[derive(Debug, Deserialize)]
struct MemberInfo {
    user_id: UserId,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    card: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserId {
    Number(i64),
    Text(String),
}

impl UserId {
    fn into_string(self) -> String {
        match self {
            Self::Number(id) => id.to_string(),
            Self::Text(id) => id,
        }
    }
}

fn parse_member_list(response: ActionResponse) -> Result<Vec<RosterEntry>, FetchError> {
    if response.status != "ok" || response.retcode != 0 {
        return Err(FetchError::Api {
            retcode: response.retcode,
        });
    }

    Ok(response
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|member| {
            let nickname = if member.nickname.is_empty() {
                member.card
            } else {
                member.nickname
            };
            RosterEntry {
                user_id: member.user_id.into_string(),
                nickname,
            }
        })
        .collect())
}

#[async_trait]
impl RosterSource for OneBotRoster {
    async fn fetch_members(&self, group_id: &str) -> Result<Vec<RosterEntry>, FetchError> {
        let group = match group_id.parse::<i64>() {
            Ok(id) => json!(id),
            Err(_) => json!(group_id),
        };

        let mut req = self
            .client
            .post(&self.member_list_url)
            .json(&json!({ "group_id": group, "no_cache": true }));
        if let Some(ref token) = self.access_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let resp = req.send().await.map_err(FetchError::request)?;
        if !resp.status().is_success() {
            return Err(FetchError::Request(format!(
                "HTTP {}",
                resp.status().as_u16()
            )));
        }

        let body: ActionResponse = resp.json().await.map_err(FetchError::request)?;
        parse_member_list(body)
    }

    fn avatar_url(&self, user_id: &str) -> Option<String> {
        Some(format!(
            "https://q4.qlogo.cn/headimg_dl?dst_uin={user_id}&spec=640"
        ))
    }
}

#[derive(Debug, Clone)]
struct CachedRoster {
    members: Vec<RosterEntry>,
    fetched_at: Instant,
}

/// Keeps each group's member list for a fixed TTL.
///
/// A failed refresh returns the error and leaves the old entry where it is;
/// stale members are never served.
#[derive(Debug, Clone)]
pub struct RosterCache {
    entries: SharedState<HashMap<String, CachedRoster>>,
    ttl: Duration,
}

impl Default for RosterCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl RosterCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the cached members of `group_id`, or calls `fetch` when there
    /// are none younger than the TTL. The cache is not locked while `fetch`
    /// runs.
    pub async fn members<F, Fut>(
        &self,
        group_id: &str,
        fetch: F,
    ) -> Result<Vec<RosterEntry>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<RosterEntry>, FetchError>>,
    {
        {
            let entries = self.entries.lock().await;
            if let Some(cached) = entries
                .get(group_id)
                .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            {
                debug!(group = group_id, "roster served from cache");
                return Ok(cached.members.clone());
            }
        }

        match fetch().await {
            Ok(members) => {
                debug!(group = group_id, members = members.len(), "roster refreshed");
                self.entries.lock().await.insert(
                    group_id.to_string(),
                    CachedRoster {
                        members: members.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(members)
            }
            Err(e) => {
                warn!(group = group_id, error = %e, "roster fetch failed");
                Err(e)
            }
        }
    }

    pub async fn members_from(
        &self,
        group_id: &str,
        source: &dyn RosterSource,
    ) -> Result<Vec<RosterEntry>, FetchError> {
        self.members(group_id, || source.fetch_members(group_id))
            .await
    }

    pub async fn invalidate_all(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn members() -> Vec<RosterEntry> {
        vec![RosterEntry::new("1", "A"), RosterEntry::new("2", "B")]
    }

    async fn counted(
        calls: &AtomicUsize,
        result: Result<Vec<RosterEntry>, FetchError>,
    ) -> Result<Vec<RosterEntry>, FetchError> {
        calls.fetch_add(1, Ordering::SeqCst);
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_once_within_ttl() {
        let cache = RosterCache::default();
        let calls = AtomicUsize::new(0);

        let first = cache.members("g", || counted(&calls, Ok(members()))).await;
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = cache.members("g", || counted(&calls, Ok(vec![]))).await;

        assert_eq!(first.unwrap(), members());
        assert_eq!(second.unwrap(), members());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetches_after_ttl() {
        let cache = RosterCache::default();
        let calls = AtomicUsize::new(0);

        cache
            .members("g", || counted(&calls, Ok(members())))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(300)).await;
        let fresh = cache
            .members("g", || counted(&calls, Ok(vec![RosterEntry::new("3", "C")])))
            .await
            .unwrap();

        assert_eq!(fresh, vec![RosterEntry::new("3", "C")]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_fetch() {
        let cache = RosterCache::default();
        let calls = AtomicUsize::new(0);

        cache
            .members("g", || counted(&calls, Ok(members())))
            .await
            .unwrap();
        cache.invalidate_all().await;
        cache
            .members("g", || counted(&calls, Ok(members())))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_stale_entry_without_serving_it() {
        let cache = RosterCache::default();
        let calls = AtomicUsize::new(0);

        cache
            .members("g", || counted(&calls, Ok(members())))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;

        let failed = cache
            .members("g", || {
                counted(&calls, Err(FetchError::Request("down".into())))
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.entries.lock().await.contains_key("g"));

        // still stale, so the next lookup goes to the source again
        cache
            .members("g", || counted(&calls, Ok(members())))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_groups_are_cached_separately() {
        let cache = RosterCache::default();
        let source = StaticRoster::new(HashMap::from([
            ("g1".to_string(), members()),
            ("g2".to_string(), vec![RosterEntry::new("9", "Z")]),
        ]));

        assert_eq!(cache.members_from("g1", &source).await.unwrap(), members());
        assert_eq!(
            cache.members_from("g2", &source).await.unwrap(),
            vec![RosterEntry::new("9", "Z")]
        );
        assert!(matches!(
            cache.members_from("g3", &source).await,
            Err(FetchError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_parse_member_list() {
        let response: ActionResponse = serde_json::from_value(json!({
            "status": "ok",
            "retcode": 0,
            "data": [
                {"group_id": 100, "user_id": 12345, "nickname": "Alice", "card": ""},
                {"group_id": 100, "user_id": "67890", "nickname": "", "card": "Bob"},
            ],
        }))
        .unwrap();

        assert_eq!(
            parse_member_list(response).unwrap(),
            vec![RosterEntry::new("12345", "Alice"), RosterEntry::new("67890", "Bob")]
        );
    }

    #[test]
    fn test_parse_failed_action() {
        let response: ActionResponse = serde_json::from_value(json!({
            "status": "failed",
            "retcode": 100,
            "data": null,
        }))
        .unwrap();

        assert!(matches!(
            parse_member_list(response),
            Err(FetchError::Api { retcode: 100 })
        ));
    }

    #[test]
    fn test_onebot_avatar_url() {
        let source = OneBotRoster::new("http://127.0.0.1:3000/", None);
        assert_eq!(source.member_list_url, "http://127.0.0.1:3000/get_group_member_list");
        assert_eq!(
            source.avatar_url("42").unwrap(),
            "https://q4.qlogo.cn/headimg_dl?dst_uin=42&spec=640"
        );
    }
}
