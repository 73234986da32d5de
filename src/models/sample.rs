use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeRange { start, end }
    }

    pub fn last(duration: chrono::Duration) -> Self {
        let end = Utc::now();
        TimeRange { start: end - duration, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Overlap ratio of `self` with `other`, in `[0, 1]`, relative to the
    /// union of the two ranges. Zero when the ranges don't overlap at all.
    pub fn overlap_ratio(&self, other: &TimeRange) -> f64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end <= start {
            return 0.0;
        }
        let overlap = (end - start).num_milliseconds() as f64;
        let union_start = self.start.min(other.start);
        let union_end = self.end.max(other.end);
        let union = (union_end - union_start).num_milliseconds() as f64;
        if union <= 0.0 {
            0.0
        } else {
            overlap / union
        }
    }
}

pub type Record = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSample {
    pub event_type: String,
    pub records: Vec<Record>,
    pub sample_size: usize,
    pub sampling_rate: f64,
    pub strategy: String,
    pub time_range: TimeRange,
}

impl DataSample {
    /// Builds a sample from records, enforcing the `records.len() ==
    /// sample_size` invariant at construction rather than trusting callers.
    pub fn new(
        event_type: impl Into<String>,
        records: Vec<Record>,
        sampling_rate: f64,
        strategy: impl Into<String>,
        time_range: TimeRange,
    ) -> Self {
        let sample_size = records.len();
        DataSample {
            event_type: event_type.into(),
            records,
            sample_size,
            sampling_rate,
            strategy: strategy.into(),
            time_range,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All observed values for `attribute` across records, skipping records
    /// where the key is absent or the value is null.
    pub fn values_for(&self, attribute: &str) -> Vec<&serde_json::Value> {
        self.records
            .iter()
            .filter_map(|r| r.get(attribute))
            .filter(|v| !v.is_null())
            .collect()
    }

    /// Union of attribute names across all records, in first-seen order.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut names = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_size_matches_records_len() {
        let mut r1 = Record::new();
        r1.insert("a".into(), serde_json::json!(1));
        let sample = DataSample::new(
            "Transaction",
            vec![r1.clone(), r1],
            1.0,
            "uniform",
            TimeRange::last(chrono::Duration::hours(1)),
        );
        assert_eq!(sample.sample_size, 2);
    }

    #[test]
    fn overlap_ratio_zero_when_disjoint() {
        let now = Utc::now();
        let a = TimeRange::new(now, now + chrono::Duration::hours(1));
        let b = TimeRange::new(now + chrono::Duration::hours(2), now + chrono::Duration::hours(3));
        assert_eq!(a.overlap_ratio(&b), 0.0);
    }

    #[test]
    fn overlap_ratio_one_when_identical() {
        let now = Utc::now();
        let a = TimeRange::new(now, now + chrono::Duration::hours(1));
        assert!((a.overlap_ratio(&a) - 1.0).abs() < 1e-9);
    }
}
