// ============================================================
// Layer 6 — Metrics Report File
// ============================================================
// Writes the test-set metrics next to the checkpoint they were
// computed from:
//
//   artifacts/checkpoint/metrics.json
//   {
//       "AUROC": 0.91,
//       "AveragePrecision": 0.87,
//       "Accuracy": 0.84,
//       "F1": null
//   }
//
// Indentation is four spaces. Metrics that could not be computed
// are written as null.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::metrics_report::MetricsReport;

pub const METRICS_FILE: &str = "metrics.json";

pub fn write_metrics(dir: &Path, report: &MetricsReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create '{}'", dir.display()))?;

    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    report.serialize(&mut ser)?;

    let path = dir.join(METRICS_FILE);
    fs::write(&path, buf)
        .with_context(|| format!("Cannot write metrics to '{}'", path.display()))?;
    Ok(path)
}

#[cfg(test)]
pub fn read_metrics(path: &Path) -> Result<MetricsReport> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read metrics from '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Malformed metrics file '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_file_uses_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = MetricsReport::new();
        report.insert("MAE", 0.5);
        report.insert("R2", f64::NAN);

        let path = write_metrics(dir.path(), &report).unwrap();
        let text = fs::read_to_string(&path).unwrap();

        assert_eq!(text, "{\n    \"MAE\": 0.5,\n    \"R2\": null\n}");
        assert_eq!(read_metrics(&path).unwrap(), report);
    }
}
