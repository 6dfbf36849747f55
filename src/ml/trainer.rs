// ============================================================
// Layer 5 — Learner Wiring
// ============================================================
// Hands the network to Burn's Learner, which owns the epoch
// loop, gradient accumulation, multi-device data parallelism
// and checkpoint files.
//
// Key Burn insight:
//   - Training uses the Autodiff backend B for gradients
//   - Validation runs on B::InnerBackend (model.valid()), so the
//     validation batcher must use the inner backend too
//
// What gets configured here:
//   - Adam (ε = 1e-8) at a constant learning rate
//   - Loss metric on train and valid, learning rate on train
//   - Checkpoints: best validation loss + the last two epochs
//   - fast_dev_run: one epoch on one batch per split
//   - limit_val_batches: fraction (≤ 1) or count (> 1) of
//     validation batches
//   - resume from the checkpoint of a given epoch
//   - --quiet: no progress dashboard on the terminal
//
// After fit, the epoch with the lowest mean validation loss is
// read back from the learner's metric logs under <root>/valid;
// its checkpoint is the one kept by the metric strategy and the
// one the test split is scored with.
//
// Reference: Burn Book §5 (Learner), Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    optim::AdamConfig,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{
        checkpoint::{ComposedCheckpointingStrategy, KeepLastNCheckpoints, MetricCheckpointingStrategy},
        metric::{
            store::{Aggregate, Direction, Split},
            LearningRateMetric, LossMetric,
        },
        renderer::{MetricState, MetricsRenderer, TrainingProgress},
        LearnerBuilder, LearnerSummary, MetricSummary,
    },
};
use std::path::{Path, PathBuf};

use crate::application::app::{Strategy, TrainerSettings};
use crate::data::{batcher::SmilesBatcher, dataset::SmilesDataset};
use crate::infra::checkpoint::{checkpoint_dir, checkpoint_file};
use crate::ml::model::MolbertNetwork;

/// Name under which Burn logs `LossMetric`.
const LOSS_METRIC: &str = "Loss";

/// Output of a finished fit.
pub struct TrainedRun<B: AutodiffBackend> {
    /// Weights after the last epoch
    pub network:        MolbertNetwork<B>,
    /// Directory holding model-N.mpk files; metrics.json goes here too
    pub checkpoint_dir: PathBuf,
    pub last_epoch:     usize,
    /// Epoch with the lowest validation loss (`last_epoch` when unknown)
    pub best_epoch:     usize,
}

/// Renderer that draws nothing; progress still reaches the metric logs.
pub struct QuietRenderer;

impl MetricsRenderer for QuietRenderer {
    fn update_train(&mut self, _state: MetricState) {}
    fn update_valid(&mut self, _state: MetricState) {}
    fn render_train(&mut self, _item: TrainingProgress) {}
    fn render_valid(&mut self, _item: TrainingProgress) {}
}

pub fn fit<B: AutodiffBackend>(
    settings:    &TrainerSettings,
    network:     MolbertNetwork<B>,
    mut train:   SmilesDataset,
    mut valid:   SmilesDataset,
    num_workers: usize,
    devices:     Vec<B::Device>,
) -> Result<TrainedRun<B>> {
    let devices = select_devices::<B>(settings.strategy, devices)?;
    let device  = devices.first().cloned().context("No training device selected")?;

    let num_epochs = if settings.fast_dev_run {
        tracing::info!("fast_dev_run: one epoch on a single batch per split");
        train.truncate(settings.batch_size);
        valid.truncate(settings.batch_size);
        1
    } else {
        let keep = val_sample_limit(settings.limit_val_batches, settings.batch_size, valid.sample_count());
        if keep < valid.sample_count() {
            tracing::info!("Validating on {} of {} molecules", keep, valid.sample_count());
            valid.truncate(keep);
        }
        settings.max_epochs
    };

    // ── Data loaders ─────────────────────────────────────────────────────────
    let train_loader = DataLoaderBuilder::new(SmilesBatcher::<B>::new(device.clone()))
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .num_workers(num_workers)
        .build(train);

    let valid_loader = DataLoaderBuilder::new(SmilesBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(settings.batch_size)
        .num_workers(num_workers)
        .build(valid);

    // ── Learner ──────────────────────────────────────────────────────────────
    let checkpointing = ComposedCheckpointingStrategy::builder()
        .add(KeepLastNCheckpoints::new(2))
        .add(MetricCheckpointingStrategy::new::<LossMetric<B>>(
            Aggregate::Mean,
            Direction::Lowest,
            Split::Valid,
        ))
        .build();

    let mut builder = LearnerBuilder::new(settings.root())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(LearningRateMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .with_checkpointing_strategy(checkpointing)
        .with_application_logger(None)
        .devices(devices)
        .num_epochs(num_epochs)
        .grads_accumulation(settings.accumulate_grad_batches)
        .summary();

    if settings.quiet {
        builder = builder.renderer(QuietRenderer);
    }

    if let Some(epoch) = settings.resume_from_checkpoint {
        let file = checkpoint_file(settings.root(), epoch);
        anyhow::ensure!(file.exists(), "No checkpoint to resume from at '{}'", file.display());
        tracing::info!("Resuming from the checkpoint of epoch {}", epoch);
        builder = builder.checkpoint(epoch);
    }

    let optimizer = AdamConfig::new().with_epsilon(1e-8).init();
    let learner   = builder.build(network, optimizer, settings.learning_rate);

    let network = learner.fit(train_loader, valid_loader);

    let best_epoch = best_valid_epoch(settings.root(), num_epochs).unwrap_or(num_epochs);
    tracing::info!("Lowest validation loss at epoch {}", best_epoch);

    Ok(TrainedRun {
        network,
        checkpoint_dir: checkpoint_dir(settings.root()),
        last_epoch:     num_epochs,
        best_epoch,
    })
}

fn best_valid_epoch(root: &Path, last_epoch: usize) -> Option<usize> {
    match LearnerSummary::new(root, &[LOSS_METRIC]) {
        Ok(summary) => lowest_loss_epoch(&summary.metrics.valid, last_epoch),
        Err(e) => {
            tracing::warn!("Cannot read the learner's metric logs: {}", e);
            None
        }
    }
}

/// Epoch of the lowest validation loss up to `last_epoch`. NaN losses
/// are skipped; on a tie the earlier epoch wins.
pub fn lowest_loss_epoch(valid: &[MetricSummary], last_epoch: usize) -> Option<usize> {
    valid
        .iter()
        .find(|metric| metric.name == LOSS_METRIC)?
        .entries
        .iter()
        .filter(|entry| entry.step <= last_epoch && !entry.value.is_nan())
        .min_by(|a, b| a.value.total_cmp(&b.value))
        .map(|entry| entry.step)
}

fn select_devices<B: AutodiffBackend>(strategy: Strategy, mut devices: Vec<B::Device>) -> Result<Vec<B::Device>> {
    anyhow::ensure!(!devices.is_empty(), "No training device selected");
    match strategy {
        Strategy::SingleDevice => devices.truncate(1),
        Strategy::DataParallel if devices.len() == 1 => {
            tracing::warn!("data-parallel strategy with a single device; training on one device");
        }
        Strategy::Auto | Strategy::DataParallel => {}
    }
    tracing::info!("Training on {} device(s): {:?}", devices.len(), devices);
    Ok(devices)
}

/// Number of validation molecules to keep. `limit` ≤ 1 is a fraction
/// of the batches, larger values are a batch count. At least one
/// batch is kept.
pub fn val_sample_limit(limit: f64, batch_size: usize, len: usize) -> usize {
    let batches = len.div_ceil(batch_size);
    let keep_batches = if limit <= 1.0 {
        (batches as f64 * limit).floor() as usize
    } else {
        limit as usize
    };
    (keep_batches.max(1) * batch_size).min(len)
}
