use crate::config::{Direction, MetricSchema, MetricSpec};
use crate::engine::normalizer::{self, NormalizedMetricSet};
use crate::error::ValidationError;
use crate::feed::types::RawMetricRecord;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Letter grade, ordered worst to best so a higher composite score can never
/// map to a strictly lower grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Grade {
    F,
    D,
    DPlus,
    CMinus,
    C,
    CPlus,
    BMinus,
    B,
    BPlus,
    AMinus,
    A,
    APlus,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::APlus
        } else if score >= 85.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::AMinus
        } else if score >= 75.0 {
            Grade::BPlus
        } else if score >= 70.0 {
            Grade::B
        } else if score >= 65.0 {
            Grade::BMinus
        } else if score >= 60.0 {
            Grade::CPlus
        } else if score >= 55.0 {
            Grade::C
        } else if score >= 50.0 {
            Grade::CMinus
        } else if score >= 45.0 {
            Grade::DPlus
        } else if score >= 40.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Coarser performance bucket, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Poor,
    BelowAverage,
    Average,
    AboveAverage,
    Elite,
}

impl Tier {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            Tier::Elite
        } else if score >= 75.0 {
            Tier::AboveAverage
        } else if score >= 60.0 {
            Tier::Average
        } else if score >= 45.0 {
            Tier::BelowAverage
        } else {
            Tier::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Elite => "Elite",
            Tier::AboveAverage => "Above Average",
            Tier::Average => "Average",
            Tier::BelowAverage => "Below Average",
            Tier::Poor => "Poor",
        }
    }
}

/// One metric's share of a composite score, with the renormalized weight
/// actually applied (weights of available metrics always sum to 1.0).
#[derive(Debug, Clone)]
pub struct MetricContribution {
    pub metric: &'static str,
    pub value: f64,
    pub sub_score: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// A scored player. Immutable once produced; one per player per run.
#[derive(Debug, Clone)]
pub struct EvaluatedPlayer {
    pub rank: usize,
    pub player: String,
    pub team: String,
    pub sample: f64,
    pub composite_score: f64,
    pub grade: Grade,
    pub tier: Tier,
    pub breakdown: Vec<MetricContribution>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

/// Result of scoring one role's full cohort.
#[derive(Debug)]
pub struct CohortEvaluation {
    /// Rank-ordered by composite score descending.
    pub players: Vec<EvaluatedPlayer>,
    /// Records rejected by validation, for logging/counting only.
    pub excluded: Vec<ValidationError>,
    /// Records below the qualification sample threshold.
    pub unqualified: usize,
}

/// Neutral score used when a player has no usable metrics at all.
const NEUTRAL_SCORE: f64 = 50.0;

/// Standard-deviation floor below which a cohort metric is considered flat
/// and produces no strength/weakness flags.
const STDEV_EPSILON: f64 = 1e-9;

/// Map a canonical metric value to the benchmark bucket scale.
pub fn sub_score(value: f64, spec: &MetricSpec) -> f64 {
    let b = &spec.breakpoints;
    match spec.direction {
        Direction::LowerIsBetter => {
            if value <= b.excellent {
                95.0
            } else if value <= b.good {
                80.0
            } else if value <= b.average {
                60.0
            } else if value <= b.poor {
                40.0
            } else {
                20.0
            }
        }
        Direction::HigherIsBetter => {
            if value >= b.excellent {
                95.0
            } else if value >= b.good {
                80.0
            } else if value >= b.average {
                60.0
            } else if value >= b.poor {
                40.0
            } else {
                20.0
            }
        }
    }
}

/// Score one normalized metric set against the schema.
///
/// Unavailable metrics redistribute their weight proportionally across the
/// metrics that are present (renormalized to sum to 1.0) rather than
/// dragging the composite toward zero. Returns the composite (clamped to
/// [0, 100], one decimal) and the per-metric breakdown.
pub fn score(
    normalized: &NormalizedMetricSet,
    schema: &MetricSchema,
) -> (f64, Vec<MetricContribution>) {
    let available: Vec<(&MetricSpec, f64)> = schema
        .metrics
        .iter()
        .filter_map(|spec| normalized.get(spec.name).map(|v| (spec, v)))
        .collect();

    let total_weight: f64 = available.iter().map(|(spec, _)| spec.weight).sum();
    if total_weight <= 0.0 {
        return (NEUTRAL_SCORE, Vec::new());
    }

    let mut breakdown = Vec::with_capacity(available.len());
    let mut composite = 0.0;
    for (spec, value) in available {
        let sub = sub_score(value, spec);
        let weight = spec.weight / total_weight;
        let contribution = sub * weight;
        composite += contribution;
        breakdown.push(MetricContribution {
            metric: spec.name,
            value,
            sub_score: sub,
            weight,
            contribution,
        });
    }

    let composite = (composite.clamp(0.0, 100.0) * 10.0).round() / 10.0;
    (composite, breakdown)
}

/// Evaluate a full role cohort together.
///
/// Strength/weakness flags are population-relative, so the whole cohort is
/// scored before any player's flags are decided: a metric sub-score at least
/// one population standard deviation above (below) the cohort mean for that
/// metric is flagged. Deterministic for a given input cohort and schema.
pub fn evaluate_cohort(records: &[RawMetricRecord], schema: &MetricSchema) -> CohortEvaluation {
    let mut excluded = Vec::new();
    let mut unqualified = 0usize;
    let mut scored: Vec<EvaluatedPlayer> = Vec::new();

    for record in records {
        if record.sample < schema.min_sample {
            unqualified += 1;
            continue;
        }
        let normalized = match normalizer::normalize(record, schema) {
            Ok(n) => n,
            Err(err) => {
                warn!(player = %err.player, metric = %err.metric, reason = %err.reason,
                    "record excluded from evaluation");
                excluded.push(err);
                continue;
            }
        };
        let (composite, breakdown) = score(&normalized, schema);
        scored.push(EvaluatedPlayer {
            rank: 0,
            player: record.player.clone(),
            team: record.team.clone(),
            sample: record.sample,
            composite_score: composite,
            grade: Grade::from_score(composite),
            tier: Tier::from_score(composite),
            breakdown,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
        });
    }

    // Population statistics per metric, computed once for the whole batch.
    let mut metric_subs: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();
    for player in &scored {
        for c in &player.breakdown {
            metric_subs.entry(c.metric).or_default().push(c.sub_score);
        }
    }
    let metric_stats: BTreeMap<&'static str, (f64, f64)> = metric_subs
        .into_iter()
        .map(|(metric, subs)| {
            let n = subs.len() as f64;
            let mean = subs.iter().sum::<f64>() / n;
            let variance = subs.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            (metric, (mean, variance.sqrt()))
        })
        .collect();

    for player in &mut scored {
        for c in &player.breakdown {
            let Some(&(mean, stdev)) = metric_stats.get(c.metric) else {
                continue;
            };
            if stdev < STDEV_EPSILON {
                continue;
            }
            let label = format!("{}: {}", c.metric, c.value);
            if c.sub_score >= mean + stdev {
                player.strengths.push(label);
            } else if c.sub_score <= mean - stdev {
                player.weaknesses.push(label);
            }
        }
    }

    // Rank by composite descending; name breaks ties so output order is
    // stable across runs.
    scored.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.player.cmp(&b.player))
    });
    for (i, player) in scored.iter_mut().enumerate() {
        player.rank = i + 1;
    }

    debug!(
        role = schema.role.as_str(),
        evaluated = scored.len(),
        excluded = excluded.len(),
        unqualified,
        "cohort evaluation complete"
    );

    CohortEvaluation {
        players: scored,
        excluded,
        unqualified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricSchema;
    use std::collections::BTreeMap;

    fn record(name: &str, sample: f64, values: &[(&str, f64)]) -> RawMetricRecord {
        RawMetricRecord {
            player: name.into(),
            team: "TST".into(),
            sample,
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn sub_score_buckets_lower_is_better() {
        let schema = MetricSchema::pitchers(50.0);
        let whip = schema.metric("WHIP").unwrap();
        assert_eq!(sub_score(0.95, whip), 95.0);
        assert_eq!(sub_score(1.00, whip), 95.0); // boundary inclusive
        assert_eq!(sub_score(1.10, whip), 80.0);
        assert_eq!(sub_score(1.25, whip), 60.0);
        assert_eq!(sub_score(1.40, whip), 40.0);
        assert_eq!(sub_score(1.60, whip), 20.0);
    }

    #[test]
    fn sub_score_buckets_higher_is_better() {
        let schema = MetricSchema::pitchers(50.0);
        let csw = schema.metric("CSW%").unwrap();
        assert_eq!(sub_score(31.0, csw), 95.0);
        assert_eq!(sub_score(28.5, csw), 80.0);
        assert_eq!(sub_score(26.0, csw), 60.0);
        assert_eq!(sub_score(24.0, csw), 40.0);
        assert_eq!(sub_score(20.0, csw), 20.0);
    }

    #[test]
    fn composite_averages_with_renormalized_weights() {
        let schema = MetricSchema::pitchers(50.0);
        // Only WHIP (sub 80) and FIP (sub 60), equal 0.15 weights: the
        // renormalized split is 50/50, composite (80+60)/2 = 70.
        let raw = record("Two Metrics", 100.0, &[("WHIP", 1.10), ("FIP", 4.00)]);
        let normalized = normalizer::normalize(&raw, &schema).unwrap();
        let (composite, breakdown) = score(&normalized, &schema);
        assert!((composite - 70.0).abs() < 1e-9);
        assert_eq!(breakdown.len(), 2);
    }

    #[test]
    fn redistributed_weights_sum_to_one_regardless_of_missing_set() {
        let schema = MetricSchema::pitchers(50.0);
        let cases: &[&[(&str, f64)]] = &[
            &[("WHIP", 1.10), ("FIP", 4.00)],
            &[("WHIP", 1.10), ("CSW%", 29.0), ("Stuff+", 110.0)],
            &[("xERA", 3.60)],
        ];
        for values in cases {
            let raw = record("P", 100.0, values);
            let normalized = normalizer::normalize(&raw, &schema).unwrap();
            let (_, breakdown) = score(&normalized, &schema);
            let weight_sum: f64 = breakdown.iter().map(|c| c.weight).sum();
            assert!(
                (weight_sum - 1.0).abs() < 1e-9,
                "weights summed to {weight_sum} for {values:?}"
            );
        }
    }

    #[test]
    fn no_metrics_yields_neutral_score() {
        let schema = MetricSchema::pitchers(50.0);
        let raw = record("Ghost", 100.0, &[]);
        let normalized = normalizer::normalize(&raw, &schema).unwrap();
        let (composite, breakdown) = score(&normalized, &schema);
        assert!((composite - 50.0).abs() < 1e-9);
        assert!(breakdown.is_empty());
        assert_eq!(Grade::from_score(composite), Grade::CMinus);
        assert_eq!(Tier::from_score(composite), Tier::BelowAverage);
    }

    #[test]
    fn grade_and_tier_are_monotonic_in_score() {
        let mut last_grade = Grade::F;
        let mut last_tier = Tier::Poor;
        for i in 0..=1000 {
            let s = i as f64 / 10.0;
            let grade = Grade::from_score(s);
            let tier = Tier::from_score(s);
            assert!(grade >= last_grade, "grade regressed at score {s}");
            assert!(tier >= last_tier, "tier regressed at score {s}");
            last_grade = grade;
            last_tier = tier;
        }
        assert_eq!(last_grade, Grade::APlus);
        assert_eq!(last_tier, Tier::Elite);
    }

    #[test]
    fn grade_breakpoints_match_scale() {
        assert_eq!(Grade::from_score(92.0), Grade::APlus);
        assert_eq!(Grade::from_score(85.0), Grade::A);
        assert_eq!(Grade::from_score(82.5), Grade::AMinus);
        assert_eq!(Grade::from_score(60.0), Grade::CPlus);
        assert_eq!(Grade::from_score(39.9), Grade::F);
        assert_eq!(Tier::from_score(85.0), Tier::Elite);
        assert_eq!(Tier::from_score(74.9), Tier::Average);
        assert_eq!(Tier::from_score(44.9), Tier::Poor);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let schema = MetricSchema::pitchers(50.0);
        let records = vec![
            record("A", 120.0, &[("WHIP", 1.02), ("FIP", 3.10), ("CSW%", 31.2)]),
            record("B", 90.0, &[("WHIP", 1.31), ("SIERA", 4.45)]),
        ];
        let first = evaluate_cohort(&records, &schema);
        let second = evaluate_cohort(&records, &schema);
        assert_eq!(first.players.len(), second.players.len());
        for (a, b) in first.players.iter().zip(second.players.iter()) {
            assert_eq!(
                a.composite_score.to_bits(),
                b.composite_score.to_bits(),
                "composite for {} not bit-identical",
                a.player
            );
            assert_eq!(a.grade, b.grade);
            assert_eq!(a.tier, b.tier);
            assert_eq!(a.strengths, b.strengths);
            assert_eq!(a.weaknesses, b.weaknesses);
        }
    }

    #[test]
    fn cohort_flags_are_population_relative() {
        let schema = MetricSchema::pitchers(50.0);
        // Sub-scores per metric across the cohort: 95 / 60 / 20.
        // Mean 58.33, population stdev ~30.7, so only the extremes flag.
        let records = vec![
            record("Ace", 150.0, &[("WHIP", 0.95), ("FIP", 3.00)]),
            record("Mid", 150.0, &[("WHIP", 1.25), ("FIP", 4.10)]),
            record("Strug", 150.0, &[("WHIP", 1.60), ("FIP", 5.20)]),
        ];
        let cohort = evaluate_cohort(&records, &schema);
        let ace = cohort.players.iter().find(|p| p.player == "Ace").unwrap();
        let mid = cohort.players.iter().find(|p| p.player == "Mid").unwrap();
        let strug = cohort.players.iter().find(|p| p.player == "Strug").unwrap();

        assert_eq!(ace.strengths.len(), 2);
        assert!(ace.weaknesses.is_empty());
        assert!(mid.strengths.is_empty());
        assert!(mid.weaknesses.is_empty());
        assert_eq!(strug.weaknesses.len(), 2);
        assert!(strug.strengths.is_empty());
    }

    #[test]
    fn identical_cohort_produces_no_flags() {
        let schema = MetricSchema::pitchers(50.0);
        let records: Vec<_> = (0..4)
            .map(|i| record(&format!("Clone{i}"), 100.0, &[("WHIP", 1.10)]))
            .collect();
        let cohort = evaluate_cohort(&records, &schema);
        for p in &cohort.players {
            assert!(p.strengths.is_empty());
            assert!(p.weaknesses.is_empty());
        }
    }

    #[test]
    fn unqualified_and_invalid_records_are_excluded_not_fatal() {
        let schema = MetricSchema::pitchers(50.0);
        let records = vec![
            record("Qualified", 120.0, &[("WHIP", 1.05)]),
            record("Short Sample", 10.0, &[("WHIP", 0.80)]),
            record("Broken", 100.0, &[("WHIP", f64::NAN)]),
        ];
        let cohort = evaluate_cohort(&records, &schema);
        assert_eq!(cohort.players.len(), 1);
        assert_eq!(cohort.players[0].player, "Qualified");
        assert_eq!(cohort.unqualified, 1);
        assert_eq!(cohort.excluded.len(), 1);
        assert_eq!(cohort.excluded[0].player, "Broken");
    }

    #[test]
    fn ranking_is_descending_by_composite() {
        let schema = MetricSchema::pitchers(50.0);
        let records = vec![
            record("Worse", 100.0, &[("WHIP", 1.60)]),
            record("Better", 100.0, &[("WHIP", 0.95)]),
        ];
        let cohort = evaluate_cohort(&records, &schema);
        assert_eq!(cohort.players[0].player, "Better");
        assert_eq!(cohort.players[0].rank, 1);
        assert_eq!(cohort.players[1].rank, 2);
        assert!(cohort.players[0].composite_score > cohort.players[1].composite_score);
    }
}
