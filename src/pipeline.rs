use crate::config::{Config, MetricSchema, RetryConfig, SizingConfig};
use crate::engine::evaluator;
use crate::engine::merger::{self, BetRecommendation, IntegratedGameRow};
use crate::engine::{kelly, win_prob};
use crate::error::{ConfigError, FetchError};
use crate::feed::{GamesFeed, OddsFeed, StatsFeed};
use crate::storage;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub type RunId = u64;

/// Coarse run state. `Failed` absorbs from any non-terminal state;
/// `Cancelled` is terminal and distinct from `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Fetching,
    Evaluating,
    Integrating,
    Persisting,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchGames,
    FetchOdds,
    FetchPitcherStats,
    FetchHitterStats,
    Evaluate,
    Integrate,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchGames => "fetch_games",
            Stage::FetchOdds => "fetch_odds",
            Stage::FetchPitcherStats => "fetch_pitcher_stats",
            Stage::FetchHitterStats => "fetch_hitter_stats",
            Stage::Evaluate => "evaluate",
            Stage::Integrate => "integrate",
            Stage::Persist => "persist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    SuccessWithWarning,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: String,
    pub duration_ms: u64,
}

/// One pipeline run's record: created at trigger time, mutated as stages
/// complete, terminal once every stage ran or a hard failure aborted the
/// rest. Retained in the append-only run history.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub date: NaiveDate,
    pub bankroll: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub stages: Vec<StageResult>,
    pub total_games: usize,
    pub recommended_bets: usize,
    pub total_stake: f64,
}

/// Trigger rejection: at most one run may be active at a time.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("pipeline run {0} is already active")]
    AlreadyActive(RunId),
}

/// Orchestrator knobs pulled from the loaded config.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub data_dir: PathBuf,
    pub history_limit: usize,
    pub fetch_timeout: Duration,
    pub retry: RetryConfig,
    pub preferred_book: String,
    pub sizing: SizingConfig,
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            data_dir: PathBuf::from(&config.pipeline.data_dir),
            history_limit: config.pipeline.history_limit,
            fetch_timeout: Duration::from_millis(config.pipeline.fetch_timeout_ms),
            retry: config.retry.clone(),
            preferred_book: config.odds_feed.preferred_book.clone(),
            sizing: config.sizing.clone(),
        }
    }
}

struct State {
    active: Option<RunId>,
    next_id: RunId,
    runs: Vec<PipelineRun>,
}

struct Inner {
    cfg: OrchestratorConfig,
    pitcher_schema: MetricSchema,
    hitter_schema: MetricSchema,
    games: Box<dyn GamesFeed>,
    odds: Box<dyn OddsFeed>,
    pitcher_stats: Box<dyn StatsFeed>,
    hitter_stats: Box<dyn StatsFeed>,
    state: Mutex<State>,
    cancel: AtomicBool,
}

/// Sequences the daily stages with per-stage failure isolation, enforces
/// the single-active-run invariant, and retains run history for status
/// queries.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build an orchestrator. Schema validation happens here: a broken
    /// weight table is fatal before any run can start.
    pub fn new(
        cfg: OrchestratorConfig,
        pitcher_schema: MetricSchema,
        hitter_schema: MetricSchema,
        games: Box<dyn GamesFeed>,
        odds: Box<dyn OddsFeed>,
        pitcher_stats: Box<dyn StatsFeed>,
        hitter_stats: Box<dyn StatsFeed>,
    ) -> Result<Self, ConfigError> {
        pitcher_schema.validate()?;
        hitter_schema.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                cfg,
                pitcher_schema,
                hitter_schema,
                games,
                odds,
                pitcher_stats,
                hitter_stats,
                state: Mutex::new(State {
                    active: None,
                    next_id: 1,
                    runs: Vec::new(),
                }),
                cancel: AtomicBool::new(false),
            }),
        })
    }

    /// Start a run in the background. Rejected while another run is active.
    pub fn trigger(&self, date: NaiveDate, bankroll: f64) -> Result<RunId, TriggerError> {
        let id = self.begin_run(date, bankroll)?;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            execute(inner, id, date, bankroll).await;
        });
        Ok(id)
    }

    /// Start a run and wait for it to finish.
    pub async fn run_blocking(
        &self,
        date: NaiveDate,
        bankroll: f64,
    ) -> Result<RunId, TriggerError> {
        let id = self.begin_run(date, bankroll)?;
        execute(self.inner.clone(), id, date, bankroll).await;
        Ok(id)
    }

    /// Guarded state transition: register the run only if no other run is
    /// active.
    fn begin_run(&self, date: NaiveDate, bankroll: f64) -> Result<RunId, TriggerError> {
        let mut state = self.inner.state.lock().expect("pipeline state poisoned");
        if let Some(active) = state.active {
            return Err(TriggerError::AlreadyActive(active));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.active = Some(id);
        self.inner.cancel.store(false, Ordering::SeqCst);
        state.runs.push(PipelineRun {
            id,
            date,
            bankroll,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Pending,
            stages: Vec::new(),
            total_games: 0,
            recommended_bets: 0,
            total_stake: 0.0,
        });
        info!(run_id = id, date = %date, bankroll, "pipeline run registered");
        Ok(id)
    }

    /// The requested run, or the most recent one when `run_id` is None.
    pub fn status(&self, run_id: Option<RunId>) -> Option<PipelineRun> {
        let state = self.inner.state.lock().expect("pipeline state poisoned");
        match run_id {
            Some(id) => state.runs.iter().find(|r| r.id == id).cloned(),
            None => state.runs.last().cloned(),
        }
    }

    /// Recent runs, most recent first.
    pub fn history(&self, limit: usize) -> Vec<PipelineRun> {
        let state = self.inner.state.lock().expect("pipeline state poisoned");
        state.runs.iter().rev().take(limit).cloned().collect()
    }

    /// Request cooperative cancellation of the active run. Checked between
    /// stages, not mid-stage. Returns false when nothing is running.
    pub fn stop(&self) -> bool {
        let state = self.inner.state.lock().expect("pipeline state poisoned");
        if state.active.is_some() {
            self.inner.cancel.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Run execution
// ---------------------------------------------------------------------------

struct FetchOutcome<T> {
    result: Result<Vec<T>, FetchError>,
    attempts: u32,
    duration_ms: u64,
}

/// Run one fetch with a per-call timeout and the bounded retry policy.
/// Timeouts count as transient; permanent failures escalate immediately.
async fn fetch_with_retry<T, F, Fut>(
    label: &str,
    retry: &RetryConfig,
    per_call_timeout: Duration,
    op: F,
) -> FetchOutcome<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let started = std::time::Instant::now();
    let mut attempts = 0u32;
    let result = loop {
        attempts += 1;
        let outcome = match tokio::time::timeout(per_call_timeout, op()).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Transient(format!(
                "timed out after {}ms",
                per_call_timeout.as_millis()
            ))),
        };
        match outcome {
            Ok(v) => break Ok(v),
            Err(e) if e.is_transient() && attempts < retry.max_attempts => {
                let backoff = retry.backoff_base_ms.saturating_mul(1 << (attempts - 1));
                let jitter = rand::thread_rng().gen_range(0..=retry.backoff_base_ms / 2);
                warn!(
                    source = label,
                    attempt = attempts,
                    error = %e,
                    backoff_ms = backoff + jitter,
                    "transient fetch failure, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }
            Err(e) => break Err(e),
        }
    };
    FetchOutcome {
        result,
        attempts,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Size a stake for a row. Only rows with odds and both starter
/// evaluations get one; the larger positive-Kelly side wins.
fn recommend(
    row: &IntegratedGameRow,
    bankroll: f64,
    sizing: &SizingConfig,
) -> Option<BetRecommendation> {
    let odds = row.odds.as_ref()?;
    let home = row.home_starter.as_ref()?;
    let away = row.away_starter.as_ref()?;

    let p_home = win_prob::home_win_probability(home.composite_score, away.composite_score);
    let home_dec = odds
        .home_moneyline
        .map(kelly::american_to_decimal)
        .unwrap_or(sizing.default_odds);
    let away_dec = odds
        .away_moneyline
        .map(kelly::american_to_decimal)
        .unwrap_or(sizing.default_odds);

    let home_stake = kelly::kelly_stake(p_home, home_dec, bankroll, sizing.max_bet_fraction);
    let away_stake = kelly::kelly_stake(1.0 - p_home, away_dec, bankroll, sizing.max_bet_fraction);

    if home_stake <= 0.0 && away_stake <= 0.0 {
        return None;
    }
    if home_stake >= away_stake {
        Some(BetRecommendation {
            side: "home",
            win_probability: p_home,
            decimal_odds: home_dec,
            stake: home_stake,
        })
    } else {
        Some(BetRecommendation {
            side: "away",
            win_probability: 1.0 - p_home,
            decimal_odds: away_dec,
            stake: away_stake,
        })
    }
}

fn with_run(inner: &Inner, id: RunId, f: impl FnOnce(&mut PipelineRun)) {
    let mut state = inner.state.lock().expect("pipeline state poisoned");
    if let Some(run) = state.runs.iter_mut().find(|r| r.id == id) {
        f(run);
    }
}

/// Mark the run terminal, release the active slot, and trim history.
fn finish(inner: &Inner, id: RunId, status: RunStatus) {
    let mut state = inner.state.lock().expect("pipeline state poisoned");
    if let Some(run) = state.runs.iter_mut().find(|r| r.id == id) {
        run.status = status;
        run.finished_at = Some(Utc::now());
    }
    state.active = None;
    let limit = inner.cfg.history_limit;
    if state.runs.len() > limit {
        let drop_count = state.runs.len() - limit;
        state.runs.drain(..drop_count);
    }
}

fn skip_remaining(inner: &Inner, id: RunId, stages: &[Stage]) {
    with_run(inner, id, |run| {
        for &stage in stages {
            run.stages.push(StageResult {
                stage,
                status: StageStatus::Skipped,
                detail: String::new(),
                duration_ms: 0,
            });
        }
    });
}

fn cancel_requested(inner: &Inner) -> bool {
    inner.cancel.load(Ordering::SeqCst)
}

/// Turn a fetch outcome for an optional source into a stage result plus the
/// (possibly empty) data; the merger's null/fallback policy covers gaps.
fn optional_stage<T>(stage: Stage, outcome: FetchOutcome<T>) -> (StageResult, Vec<T>) {
    match outcome.result {
        Ok(records) => {
            let status = if outcome.attempts > 1 {
                StageStatus::SuccessWithWarning
            } else {
                StageStatus::Success
            };
            let detail = if outcome.attempts > 1 {
                format!(
                    "{} records after {} attempts",
                    records.len(),
                    outcome.attempts
                )
            } else {
                format!("{} records", records.len())
            };
            (
                StageResult {
                    stage,
                    status,
                    detail,
                    duration_ms: outcome.duration_ms,
                },
                records,
            )
        }
        Err(e) => {
            warn!(stage = stage.as_str(), error = %e, "optional source unavailable, continuing without it");
            (
                StageResult {
                    stage,
                    status: StageStatus::SuccessWithWarning,
                    detail: format!("unavailable ({e}), continuing without"),
                    duration_ms: outcome.duration_ms,
                },
                Vec::new(),
            )
        }
    }
}

async fn execute(inner: Arc<Inner>, id: RunId, date: NaiveDate, bankroll: f64) {
    let run_started = std::time::Instant::now();
    with_run(&inner, id, |run| run.status = RunStatus::Fetching);

    // All sources fetched concurrently; everything is collected before
    // evaluation starts.
    let retry = inner.cfg.retry.clone();
    let per_call = inner.cfg.fetch_timeout;
    let (games_out, odds_out, pitchers_out, hitters_out) = tokio::join!(
        fetch_with_retry("games", &retry, per_call, || inner.games.fetch(date)),
        fetch_with_retry("odds", &retry, per_call, || inner.odds.fetch(date)),
        fetch_with_retry("pitcher_stats", &retry, per_call, || inner
            .pitcher_stats
            .fetch(date)),
        fetch_with_retry("hitter_stats", &retry, per_call, || inner
            .hitter_stats
            .fetch(date)),
    );

    // Games are the hard dependency; the rest degrade to warnings.
    let games = match games_out.result {
        Ok(games) => {
            let status = if games_out.attempts > 1 {
                StageStatus::SuccessWithWarning
            } else {
                StageStatus::Success
            };
            with_run(&inner, id, |run| {
                run.total_games = games.len();
                run.stages.push(StageResult {
                    stage: Stage::FetchGames,
                    status,
                    detail: format!("{} games", games.len()),
                    duration_ms: games_out.duration_ms,
                });
            });
            games
        }
        Err(e) => {
            with_run(&inner, id, |run| {
                run.stages.push(StageResult {
                    stage: Stage::FetchGames,
                    status: StageStatus::Failed,
                    detail: e.to_string(),
                    duration_ms: games_out.duration_ms,
                });
            });
            // The other fetches already ran concurrently; record what they
            // produced, then abort everything downstream.
            let (odds_stage, _) = optional_stage(Stage::FetchOdds, odds_out);
            let (pitchers_stage, _) = optional_stage(Stage::FetchPitcherStats, pitchers_out);
            let (hitters_stage, _) = optional_stage(Stage::FetchHitterStats, hitters_out);
            with_run(&inner, id, |run| {
                run.stages.push(odds_stage);
                run.stages.push(pitchers_stage);
                run.stages.push(hitters_stage);
            });
            skip_remaining(
                &inner,
                id,
                &[Stage::Evaluate, Stage::Integrate, Stage::Persist],
            );
            tracing::error!(run_id = id, error = %e, "games fetch failed, aborting run");
            finish(&inner, id, RunStatus::Failed);
            return;
        }
    };

    let (odds_stage, odds) = optional_stage(Stage::FetchOdds, odds_out);
    let (pitchers_stage, raw_pitchers) = optional_stage(Stage::FetchPitcherStats, pitchers_out);
    let (hitters_stage, raw_hitters) = optional_stage(Stage::FetchHitterStats, hitters_out);
    with_run(&inner, id, |run| {
        run.stages.push(odds_stage);
        run.stages.push(pitchers_stage);
        run.stages.push(hitters_stage);
    });

    if cancel_requested(&inner) {
        skip_remaining(&inner, id, &[Stage::Evaluate, Stage::Integrate, Stage::Persist]);
        finish(&inner, id, RunStatus::Cancelled);
        info!(run_id = id, "run cancelled after fetch stage");
        return;
    }

    // Evaluate both cohorts.
    with_run(&inner, id, |run| run.status = RunStatus::Evaluating);
    let stage_started = std::time::Instant::now();
    let pitcher_cohort = evaluator::evaluate_cohort(&raw_pitchers, &inner.pitcher_schema);
    let hitter_cohort = evaluator::evaluate_cohort(&raw_hitters, &inner.hitter_schema);
    let excluded = pitcher_cohort.excluded.len() + hitter_cohort.excluded.len();
    with_run(&inner, id, |run| {
        run.stages.push(StageResult {
            stage: Stage::Evaluate,
            status: if excluded > 0 {
                StageStatus::SuccessWithWarning
            } else {
                StageStatus::Success
            },
            detail: format!(
                "{} pitchers, {} hitters scored ({} records excluded)",
                pitcher_cohort.players.len(),
                hitter_cohort.players.len(),
                excluded
            ),
            duration_ms: stage_started.elapsed().as_millis() as u64,
        });
    });

    if cancel_requested(&inner) {
        skip_remaining(&inner, id, &[Stage::Integrate, Stage::Persist]);
        finish(&inner, id, RunStatus::Cancelled);
        info!(run_id = id, "run cancelled after evaluate stage");
        return;
    }

    // Integrate into one row per game and size stakes where possible.
    with_run(&inner, id, |run| run.status = RunStatus::Integrating);
    let stage_started = std::time::Instant::now();
    let mut rows = merger::merge(
        &games,
        &odds,
        &pitcher_cohort.players,
        &hitter_cohort.players,
        &inner.cfg.preferred_book,
    );
    for row in &mut rows {
        row.recommendation = recommend(row, bankroll, &inner.cfg.sizing);
    }
    let recommended: Vec<&IntegratedGameRow> =
        rows.iter().filter(|r| r.recommendation.is_some()).collect();
    let total_stake: f64 = recommended
        .iter()
        .filter_map(|r| r.recommendation.as_ref())
        .map(|b| b.stake)
        .sum();
    with_run(&inner, id, |run| {
        run.recommended_bets = recommended.len();
        run.total_stake = total_stake;
        run.stages.push(StageResult {
            stage: Stage::Integrate,
            status: StageStatus::Success,
            detail: format!("{} rows, {} recommended bets", rows.len(), recommended.len()),
            duration_ms: stage_started.elapsed().as_millis() as u64,
        });
    });

    if cancel_requested(&inner) {
        skip_remaining(&inner, id, &[Stage::Persist]);
        finish(&inner, id, RunStatus::Cancelled);
        info!(run_id = id, "run cancelled after integrate stage");
        return;
    }

    // Persist the daily dataset and cohort reports.
    with_run(&inner, id, |run| run.status = RunStatus::Persisting);
    let stage_started = std::time::Instant::now();
    let persisted = storage::write_daily(
        &inner.cfg.data_dir,
        date,
        &rows,
        &pitcher_cohort.players,
        &inner.pitcher_schema,
        &hitter_cohort.players,
        &inner.hitter_schema,
    );
    match persisted {
        Ok(paths) => {
            with_run(&inner, id, |run| {
                run.stages.push(StageResult {
                    stage: Stage::Persist,
                    status: StageStatus::Success,
                    detail: format!("{} files written", paths.len()),
                    duration_ms: stage_started.elapsed().as_millis() as u64,
                });
            });
            finish(&inner, id, RunStatus::Completed);
            info!(
                run_id = id,
                duration_ms = run_started.elapsed().as_millis() as u64,
                games = games.len(),
                bets = recommended.len(),
                total_stake,
                "pipeline run completed"
            );
        }
        Err(e) => {
            with_run(&inner, id, |run| {
                run.stages.push(StageResult {
                    stage: Stage::Persist,
                    status: StageStatus::Failed,
                    detail: e.to_string(),
                    duration_ms: stage_started.elapsed().as_millis() as u64,
                });
            });
            finish(&inner, id, RunStatus::Failed);
            tracing::error!(run_id = id, error = %e, "persist stage failed");
        }
    }
}
