use crate::engine::evaluator::{EvaluatedPlayer, Grade, Tier};
use crate::engine::matcher::{self, GameKey};
use crate::feed::types::{GameRecord, GameStatus, OddsRecord};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Which of a row's source joins succeeded. Missing sides stay explicitly
/// null in the row; nothing is silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinFlags {
    pub odds: bool,
    pub home_starter: bool,
    pub away_starter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Full,
    Partial,
    Empty,
}

impl JoinFlags {
    pub fn completeness(&self) -> Completeness {
        match (self.odds, self.home_starter, self.away_starter) {
            (true, true, true) => Completeness::Full,
            (false, false, false) => Completeness::Empty,
            _ => Completeness::Partial,
        }
    }
}

impl Completeness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Completeness::Full => "full",
            Completeness::Partial => "partial",
            Completeness::Empty => "empty",
        }
    }
}

/// The odds chosen for a game: preferred sportsbook first, else the first
/// book that offered anything.
#[derive(Debug, Clone)]
pub struct SelectedOdds {
    pub sportsbook: String,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread: Option<f64>,
    pub away_spread: Option<f64>,
    pub total_points: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

/// Compact view of one starter's evaluation carried on a row.
#[derive(Debug, Clone)]
pub struct StarterEval {
    pub player: String,
    pub composite_score: f64,
    pub grade: Grade,
    pub tier: Tier,
}

/// Lineup-level batting context for one team.
#[derive(Debug, Clone)]
pub struct TeamBatting {
    pub avg_score: f64,
    pub hitters: usize,
}

/// Stake recommendation attached when both starters and odds are known.
#[derive(Debug, Clone)]
pub struct BetRecommendation {
    pub side: &'static str,
    pub win_probability: f64,
    pub decimal_odds: f64,
    pub stake: f64,
}

/// One game's integrated view: schedule + selected odds + evaluations.
/// Exactly one row exists per (date, home, away).
#[derive(Debug, Clone)]
pub struct IntegratedGameRow {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub game_time: DateTime<Utc>,
    pub status: GameStatus,
    pub home_probable: Option<String>,
    pub away_probable: Option<String>,
    pub odds: Option<SelectedOdds>,
    pub home_starter: Option<StarterEval>,
    pub away_starter: Option<StarterEval>,
    pub home_batting: Option<TeamBatting>,
    pub away_batting: Option<TeamBatting>,
    pub flags: JoinFlags,
    pub recommendation: Option<BetRecommendation>,
}

/// Pick one book's odds for a game: the preferred book if it posted the
/// game, otherwise the first record available.
fn select_odds<'a>(
    records: Option<&Vec<&'a OddsRecord>>,
    preferred_book: &str,
) -> Option<&'a OddsRecord> {
    let records = records?;
    records
        .iter()
        .find(|r| r.sportsbook.eq_ignore_ascii_case(preferred_book))
        .or_else(|| records.first())
        .copied()
}

fn starter_lookup<'a>(
    index: &'a HashMap<(String, String), &EvaluatedPlayer>,
    probable: &Option<String>,
    team: &str,
) -> Option<StarterEval> {
    let name = probable.as_ref()?;
    let key = (matcher::normalize_player(name), matcher::normalize_team(team));
    index.get(&key).map(|p| StarterEval {
        player: p.player.clone(),
        composite_score: p.composite_score,
        grade: p.grade,
        tier: p.tier,
    })
}

/// Join games, odds, and evaluated players into one row per game.
///
/// Starter joins are exact-match after name/team normalization and fail
/// soft: an unmatched probable pitcher leaves the evaluation null and clears
/// the corresponding completeness flag, since upstream name spellings vary.
/// Output is ordered by scheduled time ascending, then home team.
pub fn merge(
    games: &[GameRecord],
    odds: &[OddsRecord],
    pitchers: &[EvaluatedPlayer],
    hitters: &[EvaluatedPlayer],
    preferred_book: &str,
) -> Vec<IntegratedGameRow> {
    let mut odds_index: HashMap<GameKey, Vec<&OddsRecord>> = HashMap::new();
    for rec in odds {
        let key = matcher::game_key(rec.date, &rec.home_team, &rec.away_team);
        odds_index.entry(key).or_default().push(rec);
    }

    let mut pitcher_index: HashMap<(String, String), &EvaluatedPlayer> = HashMap::new();
    for p in pitchers {
        let key = (
            matcher::normalize_player(&p.player),
            matcher::normalize_team(&p.team),
        );
        pitcher_index.entry(key).or_insert(p);
    }

    let mut batting: HashMap<String, TeamBatting> = HashMap::new();
    {
        let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
        for h in hitters {
            let team = matcher::normalize_team(&h.team);
            let entry = sums.entry(team).or_insert((0.0, 0));
            entry.0 += h.composite_score;
            entry.1 += 1;
        }
        for (team, (sum, count)) in sums {
            batting.insert(
                team,
                TeamBatting {
                    avg_score: sum / count as f64,
                    hitters: count,
                },
            );
        }
    }

    let mut rows: Vec<IntegratedGameRow> = games
        .iter()
        .map(|game| {
            let key = matcher::game_key(game.date, &game.home_team, &game.away_team);
            let selected = select_odds(odds_index.get(&key), preferred_book).map(|r| SelectedOdds {
                sportsbook: r.sportsbook.clone(),
                home_moneyline: r.home_moneyline,
                away_moneyline: r.away_moneyline,
                home_spread: r.home_spread,
                away_spread: r.away_spread,
                total_points: r.total_points,
                fetched_at: r.fetched_at,
            });

            let home_starter = starter_lookup(&pitcher_index, &game.home_probable, &game.home_team);
            let away_starter = starter_lookup(&pitcher_index, &game.away_probable, &game.away_team);

            let flags = JoinFlags {
                odds: selected.is_some(),
                home_starter: home_starter.is_some(),
                away_starter: away_starter.is_some(),
            };

            IntegratedGameRow {
                date: game.date,
                home_team: matcher::normalize_team(&game.home_team),
                away_team: matcher::normalize_team(&game.away_team),
                game_time: game.game_time,
                status: game.status,
                home_probable: game.home_probable.clone(),
                away_probable: game.away_probable.clone(),
                odds: selected,
                home_starter,
                away_starter,
                home_batting: batting.get(&matcher::normalize_team(&game.home_team)).cloned(),
                away_batting: batting.get(&matcher::normalize_team(&game.away_team)).cloned(),
                flags,
                recommendation: None,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.game_time
            .cmp(&b.game_time)
            .then_with(|| a.home_team.cmp(&b.home_team))
    });

    debug!(
        games = games.len(),
        with_odds = rows.iter().filter(|r| r.flags.odds).count(),
        with_both_starters = rows
            .iter()
            .filter(|r| r.flags.home_starter && r.flags.away_starter)
            .count(),
        "merged daily dataset"
    );

    rows
}
