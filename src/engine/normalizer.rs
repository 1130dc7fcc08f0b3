use crate::config::MetricSchema;
use crate::error::ValidationError;
use crate::feed::types::RawMetricRecord;
use std::collections::BTreeMap;

/// Canonical per-metric values for one player, derived 1:1 from a raw
/// record. Ephemeral: computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetricSet {
    values: BTreeMap<&'static str, Option<f64>>,
}

impl NormalizedMetricSet {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|v| v.is_none())
    }
}

/// Threshold below which a value on a percent-scaled metric is assumed to be
/// stored in fraction form and rescaled. Ambiguous for metrics that can
/// legitimately sit below 1% on the canonical scale; kept as-is for
/// compatibility with the upstream data shape.
const FRACTION_THRESHOLD: f64 = 1.0;

/// Normalize one raw record against the schema.
///
/// Metrics declared by the schema but absent from the record stay null and
/// propagate to the evaluator as "metric unavailable". Keys the schema does
/// not declare are ignored. A present value that is non-finite or lands
/// outside the metric's hard sanity bounds fails the whole record with a
/// `ValidationError`; the caller drops the record and continues the batch.
pub fn normalize(
    raw: &RawMetricRecord,
    schema: &MetricSchema,
) -> Result<NormalizedMetricSet, ValidationError> {
    if raw.sample < 0.0 || !raw.sample.is_finite() {
        return Err(ValidationError::new(
            &raw.player,
            "sample",
            format!("sample size {} is not a valid non-negative number", raw.sample),
        ));
    }

    let mut values: BTreeMap<&'static str, Option<f64>> = BTreeMap::new();
    for spec in &schema.metrics {
        let Some(&raw_value) = raw.values.get(spec.name) else {
            values.insert(spec.name, None);
            continue;
        };

        if !raw_value.is_finite() {
            return Err(ValidationError::new(
                &raw.player,
                spec.name,
                "value is not numeric",
            ));
        }

        // Fraction-form detection on the 0–100 percent scale: values below
        // 1.0 get rescaled, values at or above 1.0 are already canonical.
        let value = if spec.percent_scale && raw_value < FRACTION_THRESHOLD {
            raw_value * 100.0
        } else {
            raw_value
        };

        let (lo, hi) = spec.hard_range;
        if value < lo || value > hi {
            return Err(ValidationError::new(
                &raw.player,
                spec.name,
                format!("{value} outside sane range [{lo}, {hi}]"),
            ));
        }

        values.insert(spec.name, Some(value));
    }

    Ok(NormalizedMetricSet { values })
}
