use crate::config::MetricSchema;
use crate::engine::evaluator::EvaluatedPlayer;
use crate::engine::merger::IntegratedGameRow;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

/// Tabular persistence of the daily outputs. Each file is written to a
/// temp path and renamed into place, so a failing run leaves the previous
/// day's (or attempt's) dataset untouched.

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Atomically replace `path` with the rows produced by `write`.
fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut csv::Writer<std::fs::File>) -> Result<()>,
) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let file = std::fs::File::create(&tmp)
        .with_context(|| format!("failed to create {}", tmp.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write(&mut writer)?;
    writer.flush()?;
    drop(writer);
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

/// Write the integrated one-row-per-game dataset.
pub fn write_integrated(dir: &Path, date: NaiveDate, rows: &[IntegratedGameRow]) -> Result<PathBuf> {
    let path = dir.join(format!("integrated_games_{}.csv", date.format("%Y-%m-%d")));
    write_atomic(&path, |w| {
        w.write_record([
            "date",
            "home_team",
            "away_team",
            "game_time",
            "status",
            "home_pitcher",
            "away_pitcher",
            "sportsbook",
            "home_moneyline",
            "away_moneyline",
            "home_spread",
            "away_spread",
            "total_points",
            "home_starter_score",
            "home_starter_grade",
            "home_starter_tier",
            "away_starter_score",
            "away_starter_grade",
            "away_starter_tier",
            "home_batting_score",
            "away_batting_score",
            "bet_side",
            "bet_stake",
            "bet_win_prob",
            "completeness",
        ])?;
        for row in rows {
            let odds = row.odds.as_ref();
            let rec = row.recommendation.as_ref();
            w.write_record([
                row.date.format("%Y-%m-%d").to_string(),
                row.home_team.clone(),
                row.away_team.clone(),
                row.game_time.to_rfc3339(),
                row.status.as_str().to_string(),
                row.home_probable.clone().unwrap_or_default(),
                row.away_probable.clone().unwrap_or_default(),
                odds.map(|o| o.sportsbook.clone()).unwrap_or_default(),
                fmt_opt(odds.and_then(|o| o.home_moneyline)),
                fmt_opt(odds.and_then(|o| o.away_moneyline)),
                fmt_opt(odds.and_then(|o| o.home_spread)),
                fmt_opt(odds.and_then(|o| o.away_spread)),
                fmt_opt(odds.and_then(|o| o.total_points)),
                fmt_opt(row.home_starter.as_ref().map(|s| s.composite_score)),
                row.home_starter
                    .as_ref()
                    .map(|s| s.grade.as_str().to_string())
                    .unwrap_or_default(),
                row.home_starter
                    .as_ref()
                    .map(|s| s.tier.as_str().to_string())
                    .unwrap_or_default(),
                fmt_opt(row.away_starter.as_ref().map(|s| s.composite_score)),
                row.away_starter
                    .as_ref()
                    .map(|s| s.grade.as_str().to_string())
                    .unwrap_or_default(),
                row.away_starter
                    .as_ref()
                    .map(|s| s.tier.as_str().to_string())
                    .unwrap_or_default(),
                fmt_opt(row.home_batting.as_ref().map(|b| b.avg_score)),
                fmt_opt(row.away_batting.as_ref().map(|b| b.avg_score)),
                rec.map(|r| r.side.to_string()).unwrap_or_default(),
                fmt_opt(rec.map(|r| (r.stake * 100.0).round() / 100.0)),
                fmt_opt(rec.map(|r| r.win_probability)),
                row.flags.completeness().as_str().to_string(),
            ])?;
        }
        Ok(())
    })?;
    info!(path = %path.display(), rows = rows.len(), "wrote integrated dataset");
    Ok(path)
}

/// Write one role's full evaluated cohort, rank-ordered, with the raw metric
/// columns the schema declares.
pub fn write_cohort(
    dir: &Path,
    date: NaiveDate,
    players: &[EvaluatedPlayer],
    schema: &MetricSchema,
) -> Result<PathBuf> {
    let path = dir.join(format!(
        "{}_evaluation_{}.csv",
        schema.role.as_str(),
        date.format("%Y-%m-%d")
    ));
    write_atomic(&path, |w| {
        let mut header = vec![
            "rank".to_string(),
            "name".to_string(),
            "team".to_string(),
            "sample".to_string(),
            "composite_score".to_string(),
            "grade".to_string(),
            "tier".to_string(),
        ];
        header.extend(schema.metrics.iter().map(|m| m.name.to_string()));
        header.push("strengths".to_string());
        header.push("weaknesses".to_string());
        w.write_record(&header)?;

        for p in players {
            let mut record = vec![
                p.rank.to_string(),
                p.player.clone(),
                p.team.clone(),
                p.sample.to_string(),
                p.composite_score.to_string(),
                p.grade.as_str().to_string(),
                p.tier.as_str().to_string(),
            ];
            for spec in &schema.metrics {
                let value = p
                    .breakdown
                    .iter()
                    .find(|c| c.metric == spec.name)
                    .map(|c| c.value.to_string())
                    .unwrap_or_default();
                record.push(value);
            }
            record.push(p.strengths.join("; "));
            record.push(p.weaknesses.join("; "));
            w.write_record(&record)?;
        }
        Ok(())
    })?;
    info!(path = %path.display(), players = players.len(), "wrote cohort report");
    Ok(path)
}

/// Persist everything one run produces. Creates the data directory on first
/// use.
pub fn write_daily(
    dir: &Path,
    date: NaiveDate,
    rows: &[IntegratedGameRow],
    pitchers: &[EvaluatedPlayer],
    pitcher_schema: &MetricSchema,
    hitters: &[EvaluatedPlayer],
    hitter_schema: &MetricSchema,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data dir {}", dir.display()))?;
    Ok(vec![
        write_integrated(dir, date, rows)?,
        write_cohort(dir, date, pitchers, pitcher_schema)?,
        write_cohort(dir, date, hitters, hitter_schema)?,
    ])
}
