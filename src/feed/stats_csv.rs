use super::types::RawMetricRecord;
use super::StatsFeed;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use tracing::warn;

/// CSV-backed per-player metric source, reading the files the stat
/// collectors export (one file per collection day, season-to-date values).
///
/// Headers vary between exports, so known alternates are canonicalized
/// before lookup. Cells that exist but don't parse become NaN so the
/// normalizer can reject the record instead of silently dropping the value.
pub struct CsvStatsFeed {
    dir: PathBuf,
    file_prefix: String,
    sample_column: &'static str,
}

impl CsvStatsFeed {
    pub fn pitchers(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_prefix: "pitcher_metrics".to_string(),
            sample_column: "IP",
        }
    }

    pub fn hitters(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_prefix: "hitter_metrics".to_string(),
            sample_column: "PA",
        }
    }

    /// Exact file for the date, else the newest dated file with the same
    /// prefix (dates sort lexically), else none.
    fn resolve_path(&self, date: NaiveDate) -> Option<PathBuf> {
        let exact = self
            .dir
            .join(format!("{}_{}.csv", self.file_prefix, date.format("%Y-%m-%d")));
        if exact.is_file() {
            return Some(exact);
        }

        let prefix = format!("{}_", self.file_prefix);
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "csv")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();
        candidates.sort();
        candidates.pop()
    }
}

/// Map alternate export headers onto canonical metric names.
fn canonical_header(header: &str) -> &str {
    match header.trim() {
        "CSW" => "CSW%",
        "Stuff" => "Stuff+",
        "wRC_plus" => "wRC+",
        "K_BB" => "K:BB",
        "Hard%" => "HardHit%",
        other => other,
    }
}

fn parse_cell(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%');
    if trimmed.is_empty() {
        return None;
    }
    // Unparseable non-empty cells surface as NaN for downstream validation.
    Some(trimmed.parse::<f64>().unwrap_or(f64::NAN))
}

fn load_from_reader<R: Read>(rdr: R, sample_column: &str) -> Result<Vec<RawMetricRecord>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| canonical_header(h).to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut player = String::new();
        let mut team = String::new();
        let mut sample = 0.0;
        let mut values: BTreeMap<String, f64> = BTreeMap::new();

        for (header, cell) in headers.iter().zip(row.iter()) {
            match header.as_str() {
                "Name" => player = cell.trim().to_string(),
                "Team" => team = cell.trim().to_string(),
                h if h == sample_column => {
                    sample = parse_cell(cell).unwrap_or(0.0);
                    if sample.is_nan() {
                        sample = 0.0;
                    }
                }
                _ => {
                    if let Some(v) = parse_cell(cell) {
                        values.insert(header.clone(), v);
                    }
                }
            }
        }

        if player.is_empty() {
            warn!("skipping stats row without a Name column value");
            continue;
        }
        records.push(RawMetricRecord {
            player,
            team,
            sample,
            values,
        });
    }
    Ok(records)
}

#[async_trait]
impl StatsFeed for CsvStatsFeed {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<RawMetricRecord>, FetchError> {
        let Some(path) = self.resolve_path(date) else {
            return Err(FetchError::Permanent(format!(
                "no {}_*.csv found under {}",
                self.file_prefix,
                self.dir.display(),
            )));
        };

        let file = std::fs::File::open(&path).map_err(|e| {
            FetchError::Transient(format!("failed to open {}: {e}", path.display()))
        })?;
        let records = load_from_reader(file, self.sample_column)
            .map_err(|e| FetchError::Permanent(format!("CSV error in {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), count = records.len(), "loaded stats file");
        Ok(records)
    }
}
