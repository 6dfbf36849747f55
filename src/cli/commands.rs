// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `finetune` and `test`
// and all their configurable flags.
//
// `finetune` takes the arguments every training application
// shares (CommonArgs + DeviceArgs) plus the fine-tuning ones
// (FinetuneArgs). `test` re-evaluates a saved checkpoint with
// the hparams.json written by the run that produced it.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::app::{Accelerator, Precision, RunConfig, Strategy, TrainerSettings};
use crate::domain::task::Mode;
use crate::ml::finetune::FinetuneHparams;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the SMILES encoder on a labelled property
    Finetune(FinetuneCommand),

    /// Evaluate a saved checkpoint on a test split
    Test(TestArgs),
}

#[derive(Args, Debug)]
pub struct FinetuneCommand {
    #[command(flatten)]
    pub common:   CommonArgs,

    #[command(flatten)]
    pub device:   DeviceArgs,

    #[command(flatten)]
    pub finetune: FinetuneArgs,
}

// ─── Shared Trainer Arguments ────────────────────────────────────────────────

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Seed for shuffling, masking and weight initialisation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Directory for hparams.json, tokenizer.json and checkpoints
    #[arg(long, default_value = "artifacts")]
    pub default_root_dir: PathBuf,

    #[arg(long, default_value_t = 1)]
    pub min_epochs: usize,

    #[arg(long, default_value_t = 20)]
    pub max_epochs: usize,

    /// Fraction of an epoch between validations (only 1.0 is honoured)
    #[arg(long, default_value_t = 1.0)]
    pub val_check_interval: f64,

    /// Fraction (≤ 1) or count (> 1) of validation batches per epoch
    #[arg(long, default_value_t = 1.0)]
    pub limit_val_batches: f64,

    #[arg(long, value_enum, default_value_t = Strategy::Auto)]
    pub strategy: Strategy,

    #[arg(long, default_value_t = 1)]
    pub num_nodes: usize,

    /// Number of batches whose gradients are summed per optimizer step
    #[arg(long, default_value_t = 1)]
    pub accumulate_grad_batches: usize,

    /// One epoch on a single batch, to check the pipeline end to end
    #[arg(long)]
    pub fast_dev_run: bool,

    /// Append run-level metrics to <root>/experiments/<run id>/metrics.csv
    #[arg(long)]
    pub track_experiment: bool,

    /// Resume from the checkpoint saved after this epoch
    #[arg(long)]
    pub resume_from_checkpoint: Option<usize>,

    #[arg(long, default_value_t = 3e-5)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Hide the training dashboard; metrics are still logged to files
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Number of GPUs; 0 uses the default device of the accelerator
    #[arg(long, default_value_t = 0)]
    pub gpus: usize,

    #[arg(long, value_enum, default_value_t = Accelerator::Wgpu)]
    pub accelerator: Accelerator,

    #[arg(long, value_enum, default_value_t = Precision::Full)]
    pub precision: Precision,
}

impl CommonArgs {
    /// Combine with the device flags into the application-layer settings.
    pub fn into_settings(self, device: &DeviceArgs) -> TrainerSettings {
        TrainerSettings {
            seed:                    self.seed,
            default_root_dir:        self.default_root_dir,
            min_epochs:              self.min_epochs,
            max_epochs:              self.max_epochs,
            val_check_interval:      self.val_check_interval,
            limit_val_batches:       self.limit_val_batches,
            gpus:                    device.gpus,
            accelerator:             device.accelerator,
            precision:               device.precision,
            strategy:                self.strategy,
            num_nodes:               self.num_nodes,
            accumulate_grad_batches: self.accumulate_grad_batches,
            fast_dev_run:            self.fast_dev_run,
            track_experiment:        self.track_experiment,
            resume_from_checkpoint:  self.resume_from_checkpoint,
            learning_rate:           self.learning_rate,
            batch_size:              self.batch_size,
            quiet:                   self.quiet,
        }
    }
}

// ─── Fine-tuning Arguments ───────────────────────────────────────────────────

#[derive(Args, Debug, Clone)]
pub struct FinetuneArgs {
    #[arg(long)]
    pub train_file: PathBuf,

    #[arg(long)]
    pub valid_file: PathBuf,

    #[arg(long)]
    pub test_file: PathBuf,

    /// Longest tokenized SMILES kept, including [CLS] and [SEP]
    #[arg(long, default_value_t = 128)]
    pub max_seq_length: usize,

    #[arg(long, default_value_t = 512)]
    pub max_position_embeddings: usize,

    /// Defaults to the size of the built-in SMILES vocabulary
    #[arg(long)]
    pub vocab_size: Option<usize>,

    #[arg(long, default_value = "SMILES")]
    pub smiles_column: String,

    #[arg(long)]
    pub label_column: String,

    /// Use the tiny architecture preset
    #[arg(long)]
    pub tiny: bool,

    #[arg(long, value_enum, default_value_t = Mode::Classification)]
    pub mode: Mode,

    /// Number of logits (classification) or 1 (regression)
    #[arg(long)]
    pub output_size: usize,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 0.15)]
    pub masked_lm_probability: f64,

    /// Checkpoint whose matching weights initialise the network
    #[arg(long)]
    pub pretrained_model_path: Option<PathBuf>,

    /// 0 trains everything, -1 only the heads, n > 0 the heads and
    /// the top n encoder layers
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub freeze_level: i32,
}

/// Convert CLI FinetuneArgs into the model-layer hyper-parameters.
/// The model layer never sees clap types.
impl From<FinetuneArgs> for FinetuneHparams {
    fn from(a: FinetuneArgs) -> Self {
        FinetuneHparams {
            train_file:              a.train_file,
            valid_file:              a.valid_file,
            test_file:               a.test_file,
            max_seq_length:          a.max_seq_length,
            max_position_embeddings: a.max_position_embeddings,
            vocab_size:              a.vocab_size,
            smiles_column:           a.smiles_column,
            label_column:            a.label_column,
            tiny:                    a.tiny,
            mode:                    a.mode,
            output_size:             a.output_size,
            num_workers:             a.num_workers,
            masked_lm_probability:   a.masked_lm_probability,
            pretrained_model_path:   a.pretrained_model_path,
            freeze_level:            a.freeze_level,
        }
    }
}

impl From<FinetuneCommand> for RunConfig<FinetuneHparams> {
    fn from(c: FinetuneCommand) -> Self {
        RunConfig {
            trainer: c.common.into_settings(&c.device),
            model:   c.finetune.into(),
        }
    }
}

// ─── Test Arguments ──────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Checkpoint file, e.g. artifacts/checkpoint/model-3.mpk
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Defaults to hparams.json in the run directory of the checkpoint
    #[arg(long)]
    pub hparams: Option<PathBuf>,

    /// Evaluate on this CSV instead of the run's test file
    #[arg(long)]
    pub test_file: Option<PathBuf>,

    #[command(flatten)]
    pub device: DeviceArgs,
}

impl TestArgs {
    /// `<run dir>/hparams.json`, where the checkpoint lives in `<run dir>/checkpoint/`.
    pub fn hparams_path(&self) -> PathBuf {
        if let Some(path) = &self.hparams {
            return path.clone();
        }
        self.checkpoint
            .parent()
            .and_then(|dir| dir.parent())
            .map(|run| run.join("hparams.json"))
            .unwrap_or_else(|| PathBuf::from("hparams.json"))
    }

    /// Apply the command-line overrides to the arguments of the run that wrote the checkpoint.
    pub fn apply(&self, mut args: RunConfig<FinetuneHparams>) -> RunConfig<FinetuneHparams> {
        if let Some(file) = &self.test_file {
            args.model.test_file = file.clone();
        }
        args.trainer.gpus        = self.device.gpus;
        args.trainer.accelerator = self.device.accelerator;
        args.trainer.precision   = self.device.precision;
        args
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(extra: &[&str]) -> Cli {
        let mut argv = vec![
            "molbert-finetune", "finetune",
            "--train-file", "train.csv",
            "--valid-file", "valid.csv",
            "--test-file", "test.csv",
            "--label-column", "y",
            "--output-size", "2",
        ];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    fn run_config(cli: Cli) -> RunConfig<FinetuneHparams> {
        match cli.command {
            Commands::Finetune(cmd) => cmd.into(),
            Commands::Test(_)       => panic!("expected finetune"),
        }
    }

    #[test]
    fn test_finetune_defaults() {
        let args = run_config(parse(&[]));

        assert_eq!(args.trainer.seed, 42);
        assert_eq!(args.trainer.max_epochs, 20);
        assert_eq!(args.trainer.accelerator, Accelerator::Wgpu);
        assert_eq!(args.trainer.precision, Precision::Full);
        assert_eq!(args.model.max_seq_length, 128);
        assert_eq!(args.model.smiles_column, "SMILES");
        assert_eq!(args.model.mode, Mode::Classification);
        assert_eq!(args.model.vocab_size, None);
        assert!(!args.model.tiny);
        assert!(!args.trainer.quiet);
    }

    #[test]
    fn test_quiet_flag_reaches_trainer_settings() {
        assert!(run_config(parse(&["--quiet"])).trainer.quiet);
    }

    #[test]
    fn test_negative_freeze_level_and_enums() {
        let args = run_config(parse(&[
            "--freeze-level", "-1",
            "--mode", "regression",
            "--precision", "16",
            "--strategy", "data-parallel",
            "--tiny",
        ]));

        assert_eq!(args.model.freeze_level, -1);
        assert_eq!(args.model.mode, Mode::Regression);
        assert_eq!(args.trainer.precision, Precision::Half);
        assert_eq!(args.trainer.strategy, Strategy::DataParallel);
        assert!(args.model.tiny);
    }

    #[test]
    fn test_missing_label_column_is_rejected() {
        let result = Cli::try_parse_from([
            "molbert-finetune", "finetune",
            "--train-file", "a.csv", "--valid-file", "b.csv", "--test-file", "c.csv",
            "--output-size", "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_hparams_path_defaults_to_run_dir() {
        let cli = Cli::try_parse_from([
            "molbert-finetune", "test", "--checkpoint", "runs/a/checkpoint/model-3.mpk",
        ])
        .unwrap();
        let Commands::Test(args) = cli.command else { panic!("expected test") };
        assert_eq!(args.hparams_path(), PathBuf::from("runs/a/hparams.json"));
    }
}
