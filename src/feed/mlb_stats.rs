use super::types::*;
use super::GamesFeed;
use crate::engine::matcher;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;

/// MLB Stats API schedule fetcher. Hydrates probable pitchers so the
/// integration stage can join starter evaluations.
pub struct MlbStatsApi {
    client: Client,
    base_url: String,
}

impl MlbStatsApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GamesFeed for MlbStatsApi {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<GameRecord>, FetchError> {
        let url = format!(
            "{}/schedule?sportId=1&date={}&hydrate=probablePitcher",
            self.base_url,
            date.format("%Y-%m-%d"),
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        let schedule: ScheduleResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Permanent(format!("schedule parse failed: {e}")))?;

        let mut games = Vec::new();
        for day in schedule.dates {
            for game in day.games {
                let game_time = chrono::DateTime::parse_from_rfc3339(&game.game_date)
                    .map_err(|e| {
                        FetchError::Permanent(format!("bad gameDate {}: {e}", game.game_date))
                    })?
                    .with_timezone(&chrono::Utc);

                games.push(GameRecord {
                    date,
                    home_team: matcher::normalize_team(&game.teams.home.team.name),
                    away_team: matcher::normalize_team(&game.teams.away.team.name),
                    game_time,
                    status: GameStatus::from_detailed_state(&game.status.detailed_state),
                    home_probable: game
                        .teams
                        .home
                        .probable_pitcher
                        .map(|p| p.full_name),
                    away_probable: game
                        .teams
                        .away
                        .probable_pitcher
                        .map(|p| p.full_name),
                });
            }
        }

        tracing::debug!(date = %date, count = games.len(), "fetched schedule");
        Ok(games)
    }
}
