pub mod mlb_stats;
pub mod odds_api;
pub mod stats_csv;
pub mod types;

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use types::{GameRecord, OddsRecord, RawMetricRecord};

/// Schedule source: games for a date with probable starters.
#[async_trait]
pub trait GamesFeed: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<GameRecord>, FetchError>;
}

/// Sportsbook odds source: one record per game per bookmaker.
#[async_trait]
pub trait OddsFeed: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<OddsRecord>, FetchError>;
}

/// Per-player statistics source for one role (pitchers or hitters).
#[async_trait]
pub trait StatsFeed: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<RawMetricRecord>, FetchError>;
}
