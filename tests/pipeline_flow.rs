//! End-to-end orchestration scenarios with mock feeds.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use mlb_edge::config::{MetricSchema, RetryConfig, SizingConfig};
use mlb_edge::error::{ConfigError, FetchError};
use mlb_edge::feed::types::{GameRecord, GameStatus, OddsRecord, RawMetricRecord};
use mlb_edge::feed::{GamesFeed, OddsFeed, StatsFeed};
use mlb_edge::pipeline::{
    Orchestrator, OrchestratorConfig, PipelineRun, RunId, RunStatus, Stage, StageStatus,
    TriggerError,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Mock feeds
// ---------------------------------------------------------------------------

struct StaticGames(Vec<GameRecord>);

#[async_trait]
impl GamesFeed for StaticGames {
    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<GameRecord>, FetchError> {
        Ok(self.0.clone())
    }
}

struct FailingGames;

#[async_trait]
impl GamesFeed for FailingGames {
    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<GameRecord>, FetchError> {
        Err(FetchError::Permanent("schedule endpoint returned 404".into()))
    }
}

/// Blocks until released, so a test can hold a run in its fetch stage.
struct BlockedGames {
    release: Arc<tokio::sync::Notify>,
    games: Vec<GameRecord>,
}

#[async_trait]
impl GamesFeed for BlockedGames {
    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<GameRecord>, FetchError> {
        self.release.notified().await;
        Ok(self.games.clone())
    }
}

struct StaticOdds(Vec<OddsRecord>);

#[async_trait]
impl OddsFeed for StaticOdds {
    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<OddsRecord>, FetchError> {
        Ok(self.0.clone())
    }
}

/// Times out (transiently) a fixed number of times before succeeding.
struct FlakyOdds {
    records: Vec<OddsRecord>,
    failures_left: AtomicU32,
}

#[async_trait]
impl OddsFeed for FlakyOdds {
    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<OddsRecord>, FetchError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(FetchError::Transient("connection timed out".into()));
        }
        Ok(self.records.clone())
    }
}

struct StaticStats(Vec<RawMetricRecord>);

#[async_trait]
impl StatsFeed for StaticStats {
    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<RawMetricRecord>, FetchError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn slate_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 31).unwrap()
}

fn game(home: &str, away: &str, hour: u32, home_p: &str, away_p: &str) -> GameRecord {
    GameRecord {
        date: slate_date(),
        home_team: home.into(),
        away_team: away.into(),
        game_time: Utc.with_ymd_and_hms(2025, 8, 31, hour, 10, 0).unwrap(),
        status: GameStatus::Scheduled,
        home_probable: Some(home_p.into()),
        away_probable: Some(away_p.into()),
    }
}

/// The 2025-08-31 slate: NYM@DET and LAD@PIT, probable starters named.
fn slate() -> Vec<GameRecord> {
    vec![
        game("DET", "NYM", 17, "Tarik Skubal", "David Peterson"),
        game("PIT", "LAD", 23, "Paul Skenes", "Nobody Known"),
    ]
}

/// Odds for NYM@DET only.
fn partial_odds() -> Vec<OddsRecord> {
    vec![OddsRecord {
        date: slate_date(),
        home_team: "DET".into(),
        away_team: "NYM".into(),
        sportsbook: "fanduel".into(),
        home_moneyline: Some(-120.0),
        away_moneyline: Some(102.0),
        home_spread: Some(-1.5),
        away_spread: Some(1.5),
        total_points: Some(8.5),
        over_odds: Some(-110.0),
        under_odds: Some(-110.0),
        fetched_at: Utc.with_ymd_and_hms(2025, 8, 31, 12, 0, 0).unwrap(),
    }]
}

fn pitcher(name: &str, team: &str, whip: f64) -> RawMetricRecord {
    RawMetricRecord {
        player: name.into(),
        team: team.into(),
        sample: 130.0,
        values: BTreeMap::from([("WHIP".to_string(), whip)]),
    }
}

/// Evaluations exist for 3 of the 4 probable starters.
fn pitcher_stats() -> Vec<RawMetricRecord> {
    vec![
        pitcher("Tarik Skubal", "DET", 0.89),
        pitcher("David Peterson", "NYM", 1.25),
        pitcher("Paul Skenes", "PIT", 0.95),
    ]
}

fn hitter_stats() -> Vec<RawMetricRecord> {
    vec![
        RawMetricRecord {
            player: "Riley Greene".into(),
            team: "DET".into(),
            sample: 520.0,
            values: BTreeMap::from([("OPS".to_string(), 0.845)]),
        },
        RawMetricRecord {
            player: "Francisco Lindor".into(),
            team: "NYM".into(),
            sample: 560.0,
            values: BTreeMap::from([("OPS".to_string(), 0.820)]),
        },
    ]
}

fn test_config(tag: &str) -> OrchestratorConfig {
    let data_dir =
        std::env::temp_dir().join(format!("mlb_edge_it_{}_{}", tag, std::process::id()));
    OrchestratorConfig {
        data_dir,
        history_limit: 10,
        fetch_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
        },
        preferred_book: "fanduel".into(),
        sizing: SizingConfig::default(),
    }
}

fn build(
    tag: &str,
    games: Box<dyn GamesFeed>,
    odds: Box<dyn OddsFeed>,
) -> (Orchestrator, PathBuf) {
    let cfg = test_config(tag);
    let data_dir = cfg.data_dir.clone();
    let orchestrator = Orchestrator::new(
        cfg,
        MetricSchema::pitchers(50.0),
        MetricSchema::hitters(200.0),
        games,
        odds,
        Box::new(StaticStats(pitcher_stats())),
        Box::new(StaticStats(hitter_stats())),
    )
    .unwrap();
    (orchestrator, data_dir)
}

fn stage_status(run: &PipelineRun, stage: Stage) -> StageStatus {
    run.stages
        .iter()
        .find(|s| s.stage == stage)
        .unwrap_or_else(|| panic!("stage {stage:?} missing from run"))
        .status
}

async fn wait_terminal(orchestrator: &Orchestrator, id: RunId) -> PipelineRun {
    for _ in 0..500 {
        if let Some(run) = orchestrator.status(Some(id)) {
            if run.status.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {id} never reached a terminal status");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_data_day_produces_complete_dataset() {
    let (orchestrator, data_dir) = build(
        "partial",
        Box::new(StaticGames(slate())),
        Box::new(StaticOdds(partial_odds())),
    );

    let id = orchestrator
        .run_blocking(slate_date(), 1000.0)
        .await
        .unwrap();
    let run = orchestrator.status(Some(id)).unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_games, 2);
    assert_eq!(stage_status(&run, Stage::FetchGames), StageStatus::Success);
    assert_eq!(stage_status(&run, Stage::FetchOdds), StageStatus::Success);
    assert_eq!(stage_status(&run, Stage::Persist), StageStatus::Success);
    // The DET game has odds and both starters evaluated, so it gets a stake.
    assert_eq!(run.recommended_bets, 1);

    // Both games survive the merge: one full, one partial.
    let path = data_dir.join("integrated_games_2025-08-31.csv");
    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);

    let det = &rows[0];
    assert_eq!(&det[col("home_team")], "DET");
    assert_eq!(&det[col("sportsbook")], "fanduel");
    assert_eq!(&det[col("completeness")], "full");
    assert!(!det[col("home_starter_score")].is_empty());
    assert!(!det[col("away_starter_score")].is_empty());
    assert_eq!(&det[col("bet_side")], "home");

    let pit = &rows[1];
    assert_eq!(&pit[col("home_team")], "PIT");
    assert_eq!(&pit[col("sportsbook")], "");
    assert_eq!(&pit[col("home_moneyline")], "");
    assert!(!pit[col("home_starter_score")].is_empty());
    assert_eq!(&pit[col("away_starter_score")], "");
    assert_eq!(&pit[col("completeness")], "partial");

    // Cohort reports exist alongside the integrated dataset.
    assert!(data_dir.join("pitcher_evaluation_2025-08-31.csv").is_file());
    assert!(data_dir.join("hitter_evaluation_2025-08-31.csv").is_file());

    std::fs::remove_dir_all(&data_dir).ok();
}

#[tokio::test]
async fn transient_odds_failures_retry_into_a_warning() {
    let (orchestrator, data_dir) = build(
        "flaky",
        Box::new(StaticGames(slate())),
        Box::new(FlakyOdds {
            records: partial_odds(),
            failures_left: AtomicU32::new(2),
        }),
    );

    let id = orchestrator
        .run_blocking(slate_date(), 1000.0)
        .await
        .unwrap();
    let run = orchestrator.status(Some(id)).unwrap();

    // Two timeouts then success on the third attempt, inside the retry
    // bound: the stage warns, the run proceeds with the fetched odds.
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        stage_status(&run, Stage::FetchOdds),
        StageStatus::SuccessWithWarning
    );
    assert_eq!(run.recommended_bets, 1);

    std::fs::remove_dir_all(&data_dir).ok();
}

#[tokio::test]
async fn games_failure_fails_fast_and_skips_the_rest() {
    let (orchestrator, data_dir) = build(
        "failfast",
        Box::new(FailingGames),
        Box::new(StaticOdds(partial_odds())),
    );

    let id = orchestrator
        .run_blocking(slate_date(), 1000.0)
        .await
        .unwrap();
    let run = orchestrator.status(Some(id)).unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(stage_status(&run, Stage::FetchGames), StageStatus::Failed);
    assert_eq!(stage_status(&run, Stage::Evaluate), StageStatus::Skipped);
    assert_eq!(stage_status(&run, Stage::Integrate), StageStatus::Skipped);
    assert_eq!(stage_status(&run, Stage::Persist), StageStatus::Skipped);

    // Nothing was persisted by the failed run.
    assert!(!data_dir.join("integrated_games_2025-08-31.csv").exists());

    // The failed stage's detail is visible through the status interface.
    let failed = run
        .stages
        .iter()
        .find(|s| s.stage == Stage::FetchGames)
        .unwrap();
    assert!(failed.detail.contains("404"));

    std::fs::remove_dir_all(&data_dir).ok();
}

#[tokio::test]
async fn second_trigger_is_rejected_while_a_run_is_active() {
    let release = Arc::new(tokio::sync::Notify::new());
    let (orchestrator, data_dir) = build(
        "conflict",
        Box::new(BlockedGames {
            release: release.clone(),
            games: slate(),
        }),
        Box::new(StaticOdds(partial_odds())),
    );

    let first = orchestrator.trigger(slate_date(), 1000.0).unwrap();

    // A trigger while the first run is still fetching must be rejected
    // without disturbing the active run.
    match orchestrator.trigger(slate_date(), 500.0) {
        Err(TriggerError::AlreadyActive(active)) => assert_eq!(active, first),
        other => panic!("expected AlreadyActive, got {other:?}"),
    }

    release.notify_one();
    let run = wait_terminal(&orchestrator, first).await;
    assert_eq!(run.status, RunStatus::Completed);

    // With the slot free again, a new run starts and gets a fresh id.
    let second = orchestrator.trigger(slate_date(), 500.0).unwrap();
    assert!(second > first);
    release.notify_one();
    wait_terminal(&orchestrator, second).await;

    let history = orchestrator.history(10);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second, "history is most recent first");

    std::fs::remove_dir_all(&data_dir).ok();
}

#[tokio::test]
async fn stop_cancels_cooperatively_between_stages() {
    let release = Arc::new(tokio::sync::Notify::new());
    let (orchestrator, data_dir) = build(
        "cancel",
        Box::new(BlockedGames {
            release: release.clone(),
            games: slate(),
        }),
        Box::new(StaticOdds(partial_odds())),
    );

    let id = orchestrator.trigger(slate_date(), 1000.0).unwrap();
    assert!(orchestrator.stop(), "stop should find an active run");

    // The fetch stage finishes, then the cancel flag is honored.
    release.notify_one();
    let run = wait_terminal(&orchestrator, id).await;

    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(stage_status(&run, Stage::Persist), StageStatus::Skipped);
    assert!(!data_dir.join("integrated_games_2025-08-31.csv").exists());

    // Nothing active anymore.
    assert!(!orchestrator.stop());

    std::fs::remove_dir_all(&data_dir).ok();
}

#[test]
fn broken_weight_table_prevents_startup() {
    let mut hitters = MetricSchema::hitters(200.0);
    hitters.metrics[0].weight = 0.12; // table now sums to 0.97

    let err = Orchestrator::new(
        test_config("config"),
        MetricSchema::pitchers(50.0),
        hitters,
        Box::new(StaticGames(slate())),
        Box::new(StaticOdds(partial_odds())),
        Box::new(StaticStats(pitcher_stats())),
        Box::new(StaticStats(hitter_stats())),
    )
    .err()
    .expect("orchestrator must refuse a broken schema");

    assert!(matches!(err, ConfigError::WeightSum { .. }));
}
