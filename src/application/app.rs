// ============================================================
// Layer 2 — MolbertApp (training bootstrap)
// ============================================================
// Every training application runs the same bootstrap:
//
//   Step 1: Validate trainer settings
//   Step 2: Seed the backend RNG
//   Step 3: Log the resolved arguments, save hparams.json
//   Step 4: Build model hooks + network       (app-specific)
//   Step 5: Load train / valid / test splits  (Layer 5 hooks)
//   Step 6: Start the experiment tracker      (optional)
//   Step 7: Fit with Burn's learner           (Layer 5 - ml)
//
// Only Step 4 differs between applications, so it is the one
// required trait method; `run` is provided.
//
// Reference: Rust Book §10 (Traits: Default Implementations)
//            Burn Book §5 (Learner)

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::{checkpoint, tracking::ExperimentTracker};
use crate::ml::{
    base::MolbertModel,
    model::MolbertNetwork,
    trainer::{self, TrainedRun},
};

// ─── Trainer Settings ────────────────────────────────────────────────────────

/// Where training runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// GPU through WebGPU (Vulkan, Metal, DX12)
    Wgpu,
    /// CPU through ndarray
    Cpu,
}

/// Floating point width of the training backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Precision {
    #[value(name = "32")]
    #[serde(rename = "32")]
    Full,
    #[value(name = "16")]
    #[serde(rename = "16")]
    Half,
}

/// How the device list is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Every selected device
    Auto,
    /// Only the first selected device
    SingleDevice,
    /// Data-parallel over every selected device
    DataParallel,
}

/// Arguments shared by every training application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerSettings {
    pub seed:                    u64,
    pub default_root_dir:        PathBuf,
    pub min_epochs:              usize,
    pub max_epochs:              usize,
    pub val_check_interval:      f64,
    pub limit_val_batches:       f64,
    pub gpus:                    usize,
    pub accelerator:             Accelerator,
    pub precision:               Precision,
    pub strategy:                Strategy,
    pub num_nodes:               usize,
    pub accumulate_grad_batches: usize,
    pub fast_dev_run:            bool,
    pub track_experiment:        bool,
    pub resume_from_checkpoint:  Option<usize>,
    pub learning_rate:           f64,
    pub batch_size:              usize,
    /// No progress dashboard on the terminal
    #[serde(default)]
    pub quiet:                   bool,
}

impl TrainerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.min_epochs > self.max_epochs {
            bail!("min_epochs ({}) is greater than max_epochs ({})", self.min_epochs, self.max_epochs);
        }
        if self.num_nodes != 1 {
            bail!("Only single-node training is supported, got num_nodes={}", self.num_nodes);
        }
        if self.accumulate_grad_batches == 0 {
            bail!("accumulate_grad_batches must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.limit_val_batches.is_nan() || self.limit_val_batches <= 0.0 {
            bail!("limit_val_batches must be positive, got {}", self.limit_val_batches);
        }
        if self.val_check_interval != 1.0 {
            tracing::warn!(
                "val_check_interval={} is not supported; validation runs at the end of every epoch",
                self.val_check_interval
            );
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.default_root_dir
    }
}

/// Fully resolved arguments of a run, as saved in hparams.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig<H> {
    pub trainer: TrainerSettings,
    pub model:   H,
}

/// Everything a finished `run` hands back.
pub struct FinishedRun<M, B: AutodiffBackend> {
    pub model:   M,
    pub trained: TrainedRun<B>,
    pub tracker: Option<ExperimentTracker>,
}

// ─── MolbertApp ───────────────────────────────────────────────────────────────
pub trait MolbertApp {
    /// Model-specific arguments
    type Hparams: Serialize;
    type Model: MolbertModel;

    /// Build the model hooks and the network they describe.
    fn get_model<B: AutodiffBackend>(
        &self,
        args:   &RunConfig<Self::Hparams>,
        device: &B::Device,
    ) -> Result<(Self::Model, MolbertNetwork<B>)>;

    /// Seed, log, build and fit. `devices` must not be empty.
    fn run<B: AutodiffBackend>(
        &self,
        args:    &RunConfig<Self::Hparams>,
        devices: Vec<B::Device>,
    ) -> Result<FinishedRun<Self::Model, B>> {
        let settings = &args.trainer;
        settings.validate()?;

        B::seed(settings.seed);

        tracing::info!("Resolved arguments:\n{}", serde_json::to_string_pretty(args)?);
        checkpoint::save_hparams(settings.root(), args)?;

        let device = devices.first().cloned().context("No training device selected")?;
        let (model, network) = self.get_model::<B>(args, &device)?;
        tracing::info!("Start training model:\n{}", network);

        let splits = model.load_datasets(settings.seed)?;

        let tracker = if settings.track_experiment {
            Some(ExperimentTracker::start(settings.root(), args)?)
        } else {
            None
        };

        let trained = trainer::fit(
            settings,
            network,
            splits.train,
            splits.valid,
            model.num_workers(),
            devices,
        )?;
        tracing::info!("Training loop finished.");

        if let Some(tracker) = &tracker {
            tracker.log("train", trained.last_epoch, "epochs_completed", trained.last_epoch as f64)?;
        }

        Ok(FinishedRun { model, trained, tracker })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings(root: &Path) -> TrainerSettings {
        TrainerSettings {
            seed:                    42,
            default_root_dir:        root.to_path_buf(),
            min_epochs:              1,
            max_epochs:              1,
            val_check_interval:      1.0,
            limit_val_batches:       1.0,
            gpus:                    0,
            accelerator:             Accelerator::Cpu,
            precision:               Precision::Full,
            strategy:                Strategy::Auto,
            num_nodes:               1,
            accumulate_grad_batches: 1,
            fast_dev_run:            false,
            track_experiment:        false,
            resume_from_checkpoint:  None,
            learning_rate:           3e-5,
            batch_size:              2,
            quiet:                   true,
        }
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(settings(Path::new("artifacts")).validate().is_ok());
    }

    #[test]
    fn test_min_epochs_above_max_is_rejected() {
        let mut s = settings(Path::new("artifacts"));
        s.min_epochs = 5;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_multi_node_is_rejected() {
        let mut s = settings(Path::new("artifacts"));
        s.num_nodes = 2;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_enums_serialise_like_their_flags() {
        assert_eq!(serde_json::to_string(&Precision::Half).unwrap(), "\"16\"");
        assert_eq!(serde_json::to_string(&Strategy::DataParallel).unwrap(), "\"data-parallel\"");
    }
}
