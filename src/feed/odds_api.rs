use super::types::*;
use super::OddsFeed;
use crate::engine::matcher;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;

const SPORT_KEY: &str = "baseball_mlb";

/// the-odds-api.com v4 fetcher: moneyline, spreads, and totals across a
/// configured set of sportsbooks.
pub struct TheOddsApi {
    client: Client,
    api_key: String,
    base_url: String,
    bookmakers: String,
}

/// Parse a quota header that may be an integer or float (e.g. "14527.0").
fn parse_quota_header(headers: &reqwest::header::HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .unwrap_or(0)
}

impl TheOddsApi {
    pub fn new(api_key: String, base_url: &str, bookmakers: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            bookmakers: bookmakers.to_string(),
        }
    }

    /// Extract one OddsRecord from a bookmaker's markets for an event.
    fn book_record(
        event: &TheOddsApiEvent,
        bm: &TheOddsApiBookmaker,
        date: NaiveDate,
        fetched_at: chrono::DateTime<chrono::Utc>,
    ) -> OddsRecord {
        let mut rec = OddsRecord {
            date,
            home_team: matcher::normalize_team(&event.home_team),
            away_team: matcher::normalize_team(&event.away_team),
            sportsbook: bm.key.clone(),
            home_moneyline: None,
            away_moneyline: None,
            home_spread: None,
            away_spread: None,
            total_points: None,
            over_odds: None,
            under_odds: None,
            fetched_at,
        };

        for market in &bm.markets {
            match market.key.as_str() {
                "h2h" => {
                    for o in &market.outcomes {
                        if o.name == event.home_team {
                            rec.home_moneyline = Some(o.price);
                        } else if o.name == event.away_team {
                            rec.away_moneyline = Some(o.price);
                        }
                    }
                }
                "spreads" => {
                    for o in &market.outcomes {
                        if o.name == event.home_team {
                            rec.home_spread = o.point;
                        } else if o.name == event.away_team {
                            rec.away_spread = o.point;
                        }
                    }
                }
                "totals" => {
                    for o in &market.outcomes {
                        match o.name.as_str() {
                            "Over" => {
                                rec.total_points = o.point;
                                rec.over_odds = Some(o.price);
                            }
                            "Under" => {
                                rec.under_odds = Some(o.price);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        rec
    }
}

#[async_trait]
impl OddsFeed for TheOddsApi {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<OddsRecord>, FetchError> {
        let url = format!(
            "{}/v4/sports/{}/odds?apiKey={}&regions=us&markets=h2h,spreads,totals&oddsFormat=american&bookmakers={}",
            self.base_url, SPORT_KEY, self.api_key, self.bookmakers,
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let used = parse_quota_header(resp.headers(), "x-requests-used");
        let remaining = parse_quota_header(resp.headers(), "x-requests-remaining");
        tracing::debug!(used, remaining, "odds api quota");

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        let events: Vec<TheOddsApiEvent> = resp
            .json()
            .await
            .map_err(|e| FetchError::Permanent(format!("odds parse failed: {e}")))?;

        let fetched_at = chrono::Utc::now();
        let mut records = Vec::new();

        for event in &events {
            // Key the event to an Eastern game day so it lines up with the
            // schedule's date bucketing.
            let Some(event_date) = matcher::eastern_game_date(&event.commence_time) else {
                tracing::warn!(commence = %event.commence_time, "skipping event with bad commence time");
                continue;
            };
            if event_date != date {
                continue;
            }
            for bm in &event.bookmakers {
                records.push(Self::book_record(event, bm, event_date, fetched_at));
            }
        }

        tracing::debug!(date = %date, count = records.len(), "fetched odds records");
        Ok(records)
    }
}
