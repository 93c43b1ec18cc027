use std::sync::Arc;
use std::time::Duration;

use common::{RosterConf, Settings};
use plugins::spouse::{
    ledger::Ledger,
    reset::{Clock, ResetScheduler},
    roster::{OneBotRoster, RosterCache, RosterSource, StaticRoster},
};
use store::JsonFileStore;
use tokio::sync::Mutex;

pub mod common;
pub mod error;
pub mod plugins;
pub mod store;

pub type SharedState<T> = Arc<Mutex<T>>;

/// Everything the spouse plugin's command handlers share. Cheap to clone.
#[derive(Clone)]
pub struct Spouse {
    pub ledger: Ledger,
    pub roster: RosterCache,
    pub source: Arc<dyn RosterSource>,
    pub admins: Arc<Vec<String>>,
    pub leaderboard_size: usize,
}

impl Spouse {
    pub fn new(ledger: Ledger, roster: RosterCache, source: Arc<dyn RosterSource>) -> Self {
        Self {
            ledger,
            roster,
            source,
            admins: Arc::default(),
            leaderboard_size: 10,
        }
    }

    pub fn admins(mut self, admins: Vec<String>) -> Self {
        self.admins = Arc::new(admins);
        self
    }

    pub fn leaderboard_size(mut self, size: usize) -> Self {
        self.leaderboard_size = size;
        self
    }

    pub async fn init(settings: &Settings) -> Self {
        let store = Arc::new(JsonFileStore::new(&settings.data_dir));
        let ledger = Ledger::load(store, settings.default_limit).await;
        let roster = RosterCache::new(Duration::from_secs(settings.roster_ttl_secs));

        let source: Arc<dyn RosterSource> = match &settings.roster {
            RosterConf::Static { groups } => Arc::new(StaticRoster::new(groups.clone())),
            RosterConf::Onebot {
                endpoint,
                access_token,
            } => Arc::new(OneBotRoster::new(endpoint, access_token.clone())),
        };

        Self::new(ledger, roster, source)
            .admins(settings.admins.clone())
            .leaderboard_size(settings.leaderboard_size)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|admin| admin == user_id)
    }

    /// Daily reset bound to this plugin's ledger and roster cache.
    pub fn scheduler<C: Clock>(&self, clock: C) -> ResetScheduler<C> {
        ResetScheduler::new(clock, self.ledger.clone(), self.roster.clone())
    }
}
