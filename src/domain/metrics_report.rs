// ============================================================
// Layer 3 — Metrics Report
// ============================================================
// The test-set report: metric name → scalar, in the order the
// metrics were computed (AUROC, AveragePrecision, Accuracy, F1
// or MAE, RMSE, MSE, R2).
//
// A metric that could not be computed is stored as NaN. JSON has
// no NaN literal, so the serialised form writes `null` for it and
// reading `null` back yields NaN again. Finite values round-trip
// unchanged.
//
// Reference: serde book — "Implementing Serialize / Deserialize"

use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

#[derive(Debug, Clone, Default)]
pub struct MetricsReport {
    entries: Vec<(String, f64)>,
}

impl MetricsReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a metric, keeping first-insertion order.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None        => self.entries.push((name, value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

}

/// NaN compares equal to NaN here so a report read back from disk
/// equals the one that was written.
impl PartialEq for MetricsReport {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().zip(&other.entries).all(|(a, b)| {
                a.0 == b.0 && (a.1 == b.1 || (a.1.is_nan() && b.1.is_nan()))
            })
    }
}

impl FromIterator<(String, f64)> for MetricsReport {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut report = Self::new();
        for (name, value) in iter {
            report.insert(name, value);
        }
        report
    }
}

impl Serialize for MetricsReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            let value = if value.is_finite() { Some(*value) } else { None };
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetricsReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReportVisitor;

        impl<'de> Visitor<'de> for ReportVisitor {
            type Value = MetricsReport;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of metric names to numbers or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut report = MetricsReport::new();
                while let Some((name, value)) = access.next_entry::<String, Option<f64>>()? {
                    report.insert(name, value.unwrap_or(f64::NAN));
                }
                Ok(report)
            }
        }

        deserializer.deserialize_map(ReportVisitor)
    }
}
