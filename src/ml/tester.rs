// ============================================================
// Layer 5 — Test Epoch
// ============================================================
// Evaluates a trained network on the test split.
//
// Unlike training, the test split is scored as a whole: ranking
// metrics such as AUROC are not averages of per-batch values.
// Each step therefore only collects predictions and labels; the
// epoch end concatenates them and computes losses and metrics
// once.
//
//   test_step × N        → accumulator (predictions, labels)
//   on_test_epoch_end    → drain accumulator
//                        → losses per task + their sum
//                        → metrics (AUROC … or MAE …)
//                        → <checkpoint dir>/metrics.json
//
// The test loader uses very large batches and a single worker so
// most test sets pass through in one forward call.
//
// Reference: Burn Book §4 (DataLoader), §5 (Inference)

use anyhow::{bail, Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
    tensor::ElementConversion,
};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Arc,
};

use crate::data::{
    batcher::{SmilesBatch, SmilesBatcher},
    dataset::SmilesDataset,
};
use crate::domain::{metrics_report::MetricsReport, task::FINETUNE_TASK};
use crate::infra::report::write_metrics;
use crate::ml::{
    base::MolbertModel,
    model::{MolbertNetwork, TaskTensors},
};

pub const TEST_BATCH_SIZE: usize = 1024;

/// Loader over the whole test split, in file order.
pub fn test_dataloader<B: Backend>(
    dataset: SmilesDataset,
    device:  B::Device,
) -> Arc<dyn DataLoader<SmilesBatch<B>>> {
    DataLoaderBuilder::new(SmilesBatcher::<B>::new(device))
        .batch_size(TEST_BATCH_SIZE)
        .build(dataset)
}

/// What one test step produced.
#[derive(Debug, Clone)]
pub struct TestStepOutput<B: Backend> {
    pub predictions: TaskTensors<B>,
    pub labels:      TaskTensors<B>,
}

/// Result of a finished test epoch.
#[derive(Debug, Clone)]
pub struct TestEpochSummary {
    /// Sum of the task losses
    pub loss:      f64,
    pub metrics:   MetricsReport,
    pub test_loss: f64,
    /// `test_loss` plus one entry per task loss
    pub log:       BTreeMap<String, f64>,
    pub report_path: PathBuf,
}

pub struct TestEpoch<'a, B: Backend, M: MolbertModel> {
    network:        &'a MolbertNetwork<B>,
    model:          &'a M,
    checkpoint_dir: PathBuf,
    outputs:        Vec<TestStepOutput<B>>,
}

impl<'a, B: Backend, M: MolbertModel> TestEpoch<'a, B, M> {
    pub fn new(network: &'a MolbertNetwork<B>, model: &'a M, checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            network,
            model,
            checkpoint_dir: checkpoint_dir.into(),
            outputs: Vec::new(),
        }
    }

    /// Forward one batch and keep its predictions for the epoch end.
    pub fn test_step(&mut self, batch: SmilesBatch<B>, batch_idx: usize) -> TestStepOutput<B> {
        let molecules = batch.batch_size();
        let SmilesBatch { inputs, labels, valid: _ } = batch;

        let predictions = self.network.forward(inputs);
        let labels = self
            .network
            .tasks()
            .iter()
            .map(|task| (task.name.clone(), labels.clone()))
            .collect();

        let output = TestStepOutput { predictions, labels };
        tracing::debug!("Test step {} done ({} molecules)", batch_idx, molecules);
        self.outputs.push(output.clone());
        output
    }

    /// Aggregate every collected step. The accumulator is emptied
    /// first, so it is clear even when this returns an error.
    pub fn on_test_epoch_end(&mut self) -> Result<TestEpochSummary> {
        let outputs = std::mem::take(&mut self.outputs);
        if outputs.is_empty() {
            bail!("Test epoch ended without any test step outputs");
        }

        let (predictions, labels) = concat_outputs(outputs);

        let losses = self.network.evaluate_losses(&labels, &predictions)?;
        let mut log = BTreeMap::new();
        let mut test_loss = 0.0;
        for (name, loss) in losses {
            let value: f64 = loss.into_scalar().elem::<f64>();
            test_loss += value;
            log.insert(name, value);
        }
        log.insert("test_loss".to_string(), test_loss);

        let task_labels = labels
            .get(FINETUNE_TASK)
            .with_context(|| format!("No '{FINETUNE_TASK}' task in test outputs"))?;
        let task_predictions = predictions
            .get(FINETUNE_TASK)
            .with_context(|| format!("No '{FINETUNE_TASK}' predictions in test outputs"))?;
        let metrics = self
            .model
            .evaluate_metrics(task_labels.clone(), task_predictions.clone())?;

        let report_path = write_metrics(&self.checkpoint_dir, &metrics)?;
        tracing::info!("Writing metrics to '{}'", report_path.display());
        for (name, value) in metrics.iter() {
            tracing::info!("{:<18} {:.6}", name, value);
        }
        tracing::info!("Test losses: {:?}", log);

        Ok(TestEpochSummary { loss: test_loss, metrics, test_loss, log, report_path })
    }

    /// Run every batch of `loader` through `test_step`, then finish the epoch.
    pub fn run(&mut self, loader: Arc<dyn DataLoader<SmilesBatch<B>>>) -> Result<TestEpochSummary> {
        for (idx, batch) in loader.iter().enumerate() {
            self.test_step(batch, idx);
        }
        self.on_test_epoch_end()
    }
}

/// Concatenate step outputs per task, in accumulation order.
fn concat_outputs<B: Backend>(outputs: Vec<TestStepOutput<B>>) -> (TaskTensors<B>, TaskTensors<B>) {
    let mut predictions: BTreeMap<String, Vec<Tensor<B, 2>>> = BTreeMap::new();
    let mut labels:      BTreeMap<String, Vec<Tensor<B, 2>>> = BTreeMap::new();

    for output in outputs {
        for (name, tensor) in output.predictions {
            predictions.entry(name).or_default().push(tensor);
        }
        for (name, tensor) in output.labels {
            labels.entry(name).or_default().push(tensor);
        }
    }

    let cat = |parts: BTreeMap<String, Vec<Tensor<B, 2>>>| -> TaskTensors<B> {
        parts
            .into_iter()
            .map(|(name, tensors)| (name, Tensor::cat(tensors, 0)))
            .collect()
    };
    (cat(predictions), cat(labels))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::data::dataset::SmilesSample;
    use crate::domain::task::Mode;
    use crate::infra::report::read_metrics;
    use crate::ml::finetune::{tests::hparams, FinetuneSmilesModel};
    use crate::ml::model::tests::batch;

    type TestBackend = NdArray<f32>;

    fn setup(mode: Mode, output_size: usize) -> (FinetuneSmilesModel, MolbertNetwork<TestBackend>) {
        let model   = FinetuneSmilesModel::new(hparams(mode, output_size));
        let network = model.build_network::<TestBackend>(&Default::default()).unwrap();
        (model, network)
    }

    fn samples(n: usize) -> Vec<SmilesSample> {
        (0..n)
            .map(|i| SmilesSample {
                input_ids: vec![2, 5, 6, 3, 0, 0, 0, 0],
                label:     (i % 2) as f32,
                valid:     true,
            })
            .collect()
    }

    #[test]
    fn test_accumulator_is_drained_at_epoch_end() {
        let dir = tempfile::tempdir().unwrap();
        let (model, network) = setup(Mode::Regression, 1);
        let mut epoch = TestEpoch::new(&network, &model, dir.path());

        epoch.test_step(batch(&[0.5, 1.0]), 0);
        epoch.test_step(batch(&[2.0]), 1);
        assert_eq!(epoch.outputs.len(), 2);

        let summary = epoch.on_test_epoch_end().unwrap();
        assert_eq!(epoch.outputs.len(), 0);
        assert_eq!(summary.metrics.names(), vec!["MAE", "RMSE", "MSE", "R2"]);
        assert!(summary.log.contains_key("test_loss"));
        assert!(summary.log.contains_key(FINETUNE_TASK));
        assert_eq!(summary.loss, summary.test_loss);
    }

    #[test]
    fn test_empty_epoch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (model, network) = setup(Mode::Regression, 1);
        let mut epoch = TestEpoch::new(&network, &model, dir.path());
        assert!(epoch.on_test_epoch_end().is_err());
    }

    #[test]
    fn test_step_returns_what_it_stores() {
        let dir = tempfile::tempdir().unwrap();
        let (model, network) = setup(Mode::Classification, 2);
        let mut epoch = TestEpoch::new(&network, &model, dir.path());

        let out = epoch.test_step(batch(&[0.0, 1.0, 1.0]), 0);
        assert_eq!(out.predictions[FINETUNE_TASK].dims(), [3, 2]);
        assert_eq!(out.labels[FINETUNE_TASK].dims(), [3, 1]);
    }

    #[test]
    fn test_metrics_file_is_written_next_to_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (model, network) = setup(Mode::Classification, 2);
        let mut epoch = TestEpoch::new(&network, &model, dir.path());

        let loader  = test_dataloader::<TestBackend>(SmilesDataset::new(samples(6), None), Default::default());
        let summary = epoch.run(loader).unwrap();

        assert_eq!(summary.report_path, dir.path().join("metrics.json"));
        let written = read_metrics(&summary.report_path).unwrap();
        assert_eq!(written, summary.metrics);
        assert_eq!(written.names(), vec!["AUROC", "AveragePrecision", "Accuracy", "F1"]);
    }

    #[test]
    fn test_loader_uses_large_unshuffled_batches() {
        let loader = test_dataloader::<TestBackend>(
            SmilesDataset::new(samples(1500), None),
            Default::default(),
        );
        let sizes: Vec<usize> = loader.iter().map(|b| b.batch_size()).collect();
        assert_eq!(sizes, vec![1024, 476]);

        let first = loader.iter().next().unwrap();
        let labels = first.labels.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&labels[..4], &[0.0, 1.0, 0.0, 1.0]);
    }
}
