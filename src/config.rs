use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub games_feed: GamesFeedConfig,
    pub odds_feed: OddsFeedConfig,
    pub stats_feed: StatsFeedConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub data_dir: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

fn default_history_limit() -> usize { 10 }
fn default_fetch_timeout() -> u64 { 10_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GamesFeedConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OddsFeedConfig {
    pub base_url: String,
    /// Comma-separated bookmaker keys passed to the API.
    pub bookmakers: String,
    #[serde(default = "default_preferred_book")]
    pub preferred_book: String,
}

fn default_preferred_book() -> String {
    "fanduel".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsFeedConfig {
    pub pitcher_dir: String,
    pub hitter_dir: String,
    #[serde(default = "default_min_ip")]
    pub min_ip: f64,
    #[serde(default = "default_min_pa")]
    pub min_pa: f64,
}

fn default_min_ip() -> f64 { 50.0 }
fn default_min_pa() -> f64 { 200.0 }

#[derive(Debug, Deserialize, Clone)]
pub struct SizingConfig {
    /// Decimal odds assumed when a moneyline is unavailable (-110 standard).
    pub default_odds: f64,
    /// Cap on the fraction of bankroll risked on a single game.
    pub max_bet_fraction: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            default_odds: 1.91,
            max_bet_fraction: 0.25,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load .env into the process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    pub fn odds_api_key() -> anyhow::Result<String> {
        match std::env::var("ODDS_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => anyhow::bail!("ODDS_API_KEY not set (the-odds-api.com key)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Metric weight schemas
// ---------------------------------------------------------------------------

/// Whether a bigger raw value means a better player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// Player role a schema applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Pitcher,
    Hitter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pitcher => "pitcher",
            Role::Hitter => "hitter",
        }
    }
}

/// Benchmark thresholds for the bucket sub-score scale. For lower-is-better
/// metrics the values ascend from `excellent` to `poor`.
#[derive(Debug, Clone, Copy)]
pub struct Breakpoints {
    pub excellent: f64,
    pub good: f64,
    pub average: f64,
    pub poor: f64,
}

#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub name: &'static str,
    pub weight: f64,
    pub direction: Direction,
    /// Canonical scale is 0–100; fraction-form source values get rescaled.
    pub percent_scale: bool,
    /// Hard sanity bounds (inclusive) after rescaling.
    pub hard_range: (f64, f64),
    pub breakpoints: Breakpoints,
}

/// Immutable per-role weight table, loaded once and shared read-only by all
/// evaluation calls.
#[derive(Debug, Clone)]
pub struct MetricSchema {
    pub role: Role,
    /// Minimum qualifying sample (innings pitched or plate appearances).
    pub min_sample: f64,
    pub metrics: Vec<MetricSpec>,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl MetricSchema {
    /// Starting-pitcher table: run-prevention estimators dominate, with
    /// swing-and-miss and pitch-quality signals mixed in.
    pub fn pitchers(min_ip: f64) -> Self {
        use Direction::*;
        let m = |name, weight, direction, percent_scale, hard_range, e, g, a, p| MetricSpec {
            name,
            weight,
            direction,
            percent_scale,
            hard_range,
            breakpoints: Breakpoints { excellent: e, good: g, average: a, poor: p },
        };
        MetricSchema {
            role: Role::Pitcher,
            min_sample: min_ip,
            metrics: vec![
                m("WHIP", 0.15, LowerIsBetter, false, (0.0, 5.0), 1.00, 1.15, 1.30, 1.45),
                m("FIP", 0.15, LowerIsBetter, false, (0.0, 15.0), 3.20, 3.70, 4.20, 4.80),
                m("SIERA", 0.12, LowerIsBetter, false, (0.0, 15.0), 3.40, 3.90, 4.40, 4.90),
                m("CSW%", 0.12, HigherIsBetter, true, (0.0, 100.0), 30.0, 28.0, 25.5, 23.0),
                m("xERA", 0.10, LowerIsBetter, false, (0.0, 15.0), 3.50, 4.00, 4.50, 5.00),
                m("xFIP", 0.08, LowerIsBetter, false, (0.0, 15.0), 3.50, 4.00, 4.50, 5.00),
                m("xwOBA", 0.08, LowerIsBetter, false, (0.0, 1.0), 0.310, 0.330, 0.350, 0.370),
                m("xBA", 0.06, LowerIsBetter, false, (0.0, 1.0), 0.240, 0.260, 0.280, 0.300),
                m("xSLG", 0.06, LowerIsBetter, false, (0.0, 2.0), 0.390, 0.430, 0.470, 0.510),
                m("Stuff+", 0.08, HigherIsBetter, false, (0.0, 300.0), 105.0, 100.0, 95.0, 90.0),
            ],
        }
    }

    /// Hitter table: on-base/power production first, expected-stats and
    /// batted-ball quality behind it, plate discipline last.
    pub fn hitters(min_pa: f64) -> Self {
        use Direction::*;
        let m = |name, weight, direction, percent_scale, hard_range, e, g, a, p| MetricSpec {
            name,
            weight,
            direction,
            percent_scale,
            hard_range,
            breakpoints: Breakpoints { excellent: e, good: g, average: a, poor: p },
        };
        MetricSchema {
            role: Role::Hitter,
            min_sample: min_pa,
            metrics: vec![
                m("OPS", 0.15, HigherIsBetter, false, (0.0, 2.5), 0.900, 0.800, 0.720, 0.650),
                m("wOBA", 0.15, HigherIsBetter, false, (0.0, 1.0), 0.370, 0.340, 0.320, 0.300),
                m("wRC+", 0.15, HigherIsBetter, false, (0.0, 400.0), 130.0, 115.0, 100.0, 85.0),
                m("xwOBA", 0.12, HigherIsBetter, false, (0.0, 1.0), 0.370, 0.340, 0.320, 0.300),
                m("xBA", 0.10, HigherIsBetter, false, (0.0, 1.0), 0.280, 0.260, 0.240, 0.220),
                m("xSLG", 0.10, HigherIsBetter, false, (0.0, 2.0), 0.480, 0.420, 0.380, 0.340),
                m("HardHit%", 0.08, HigherIsBetter, true, (0.0, 100.0), 45.0, 40.0, 35.0, 30.0),
                m("Barrel%", 0.08, HigherIsBetter, true, (0.0, 100.0), 12.0, 8.0, 5.5, 3.5),
                m("K:BB", 0.07, LowerIsBetter, false, (0.0, 20.0), 1.50, 2.00, 2.75, 3.50),
            ],
        }
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSpec> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Validate the table. Called once at startup; a broken table means no
    /// pipeline run may start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let role = self.role.as_str().to_string();
        if self.metrics.is_empty() {
            return Err(ConfigError::EmptySchema { role });
        }

        let sum: f64 = self.metrics.iter().map(|m| m.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { role, sum });
        }

        for spec in &self.metrics {
            let bad = |reason: &str| ConfigError::BadMetric {
                role: role.clone(),
                metric: spec.name.to_string(),
                reason: reason.to_string(),
            };
            if spec.weight <= 0.0 {
                return Err(bad("weight must be positive"));
            }
            let (lo, hi) = spec.hard_range;
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(bad("hard range must be a finite, ordered interval"));
            }
            let b = &spec.breakpoints;
            let ordered = match spec.direction {
                Direction::HigherIsBetter => {
                    b.excellent > b.good && b.good > b.average && b.average > b.poor
                }
                Direction::LowerIsBetter => {
                    b.excellent < b.good && b.good < b.average && b.average < b.poor
                }
            };
            if !ordered {
                return Err(bad("breakpoints not ordered for direction"));
            }
            for v in [b.excellent, b.good, b.average, b.poor] {
                if v < lo || v > hi {
                    return Err(bad("breakpoint outside hard range"));
                }
            }
        }
        Ok(())
    }
}
