// ============================================================
// Layer 6 — Experiment Tracker
// ============================================================
// Optional per-run record enabled with --track-experiment.
//
// Each run gets its own directory named after its start time:
//
//   artifacts/experiments/20260114-093012/
//     hparams.json   ← resolved arguments of the run
//     metrics.csv    ← one row per logged value
//
// Example CSV output:
//   stage,epoch,metric,value
//   train,20,epochs_completed,20.000000
//   test,20,test_loss,0.412300
//   test,20,AUROC,0.913000
//
// Burn's learner keeps its own per-epoch train/valid logs under
// the root directory; the tracker only collects run-level values
// so several runs can be compared side by side.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::metrics_report::MetricsReport;

const CSV_HEADER: &str = "stage,epoch,metric,value";

pub struct ExperimentTracker {
    dir:      PathBuf,
    csv_path: PathBuf,
}

impl ExperimentTracker {
    /// Create `<root>/experiments/<run-id>/` and record the hyper-parameters.
    pub fn start<T: Serialize>(root: &Path, hparams: &T) -> Result<Self> {
        let run_id = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::start_with_id(root, &run_id, hparams)
    }

    pub fn start_with_id<T: Serialize>(root: &Path, run_id: &str, hparams: &T) -> Result<Self> {
        let dir = root.join("experiments").join(run_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        fs::write(dir.join("hparams.json"), serde_json::to_string_pretty(hparams)?)
            .with_context(|| format!("Cannot write hparams into '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{CSV_HEADER}")?;
        }

        tracing::info!("Tracking experiment in '{}'", dir.display());
        Ok(Self { dir, csv_path })
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one value as a new CSV row.
    pub fn log(&self, stage: &str, epoch: usize, metric: &str, value: f64) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{stage},{epoch},{metric},{value:.6}")?;
        Ok(())
    }

    pub fn log_report(&self, stage: &str, epoch: usize, report: &MetricsReport) -> Result<()> {
        for (name, value) in report.iter() {
            self.log(stage, epoch, name, value)?;
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_appended_under_header() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::start_with_id(
            dir.path(), "run-1", &serde_json::json!({"seed": 1}),
        ).unwrap();

        let mut report = MetricsReport::new();
        report.insert("MAE", 0.25);
        tracker.log("test", 3, "test_loss", 0.5).unwrap();
        tracker.log_report("test", 3, &report).unwrap();

        let csv = fs::read_to_string(tracker.dir().join("metrics.csv")).unwrap();
        assert_eq!(csv, "stage,epoch,metric,value\ntest,3,test_loss,0.500000\ntest,3,MAE,0.250000\n");
        assert!(dir.path().join("experiments/run-1/hparams.json").exists());
    }
}
