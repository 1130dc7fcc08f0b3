use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Normalized internal types used by the pipeline (provider-agnostic).

/// Game status as reported by the schedule source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Unknown,
}

impl GameStatus {
    /// Map the schedule API's free-form detailed state onto the enum.
    pub fn from_detailed_state(state: &str) -> Self {
        if state.contains("Postponed") {
            GameStatus::Postponed
        } else if state.contains("Final") || state.contains("Game Over") {
            GameStatus::Final
        } else if state.contains("In Progress") || state.contains("Live") {
            GameStatus::InProgress
        } else if state.contains("Scheduled") || state.contains("Pre-Game") || state.contains("Warmup") {
            GameStatus::Scheduled
        } else {
            GameStatus::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in-progress",
            GameStatus::Final => "final",
            GameStatus::Postponed => "postponed",
            GameStatus::Unknown => "unknown",
        }
    }
}

/// One scheduled game with probable starters.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub game_time: DateTime<Utc>,
    pub status: GameStatus,
    pub home_probable: Option<String>,
    pub away_probable: Option<String>,
}

/// Odds for one game from one sportsbook. A game usually produces several of
/// these, one per book; the merger picks one by priority policy.
#[derive(Debug, Clone)]
pub struct OddsRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub sportsbook: String,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread: Option<f64>,
    pub away_spread: Option<f64>,
    pub total_points: Option<f64>,
    pub over_odds: Option<f64>,
    pub under_odds: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

/// Raw per-player metric values for one (player, date-scope). Absent key =
/// metric unavailable. A present NaN marks a source cell that existed but
/// could not be parsed, so validation can reject the record downstream.
#[derive(Debug, Clone)]
pub struct RawMetricRecord {
    pub player: String,
    pub team: String,
    /// Sample-size indicator: innings pitched for pitchers, plate
    /// appearances for hitters.
    pub sample: f64,
    pub values: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// MLB Stats API schedule response
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ScheduleResponse {
    #[serde(default)]
    pub dates: Vec<ScheduleDate>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleDate {
    pub date: String,
    #[serde(default)]
    pub games: Vec<ScheduleGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGame {
    pub game_date: String,
    #[serde(default)]
    pub status: ScheduleStatus,
    pub teams: ScheduleTeams,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    #[serde(default)]
    pub detailed_state: String,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleTeams {
    pub away: ScheduleSide,
    pub home: ScheduleSide,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSide {
    pub team: ScheduleTeam,
    #[serde(default)]
    pub probable_pitcher: Option<SchedulePitcher>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleTeam {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePitcher {
    pub full_name: String,
}

// ---------------------------------------------------------------------------
// the-odds-api.com v4 response: top-level array of events
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TheOddsApiEvent {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: String,
    #[serde(default)]
    pub bookmakers: Vec<TheOddsApiBookmaker>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiBookmaker {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub last_update: String,
    pub markets: Vec<TheOddsApiMarket>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiMarket {
    pub key: String,
    pub outcomes: Vec<TheOddsApiOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiOutcome {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}
