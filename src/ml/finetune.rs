// ============================================================
// Layer 5 — SMILES Fine-tuning Model
// ============================================================
// Fine-tunes the SMILES encoder on one labelled property.
//
// Presets:
//   tiny → hidden 16,  2 layers,  2 heads, FFN 32    (smoke tests)
//   full → hidden 768, 12 layers, 12 heads, FFN 3072 (BERT-base)
//
// The single task is called "finetune". Classification predicts
// two logits per molecule (class 0 / class 1); regression
// predicts one value.
//
// Test metrics:
//   classification → AUROC, AveragePrecision, Accuracy, F1
//   regression     → MAE, RMSE, MSE, R2
//
// Reference: Fabian et al. (2020) Molecular representation
//            learning with language models and domain-relevant
//            auxiliary tasks

use anyhow::{bail, Result};
use burn::{prelude::*, tensor::activation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::{
    dataset::{DatasetSplits, Masking, SmilesDataset},
    featurizer::SmilesFeaturizer,
    loader::CsvMoleculeSource,
};
use crate::domain::{
    metrics_report::MetricsReport,
    task::{Mode, Task, FINETUNE_TASK},
};
use crate::infra::tokenizer_store::smiles_vocab_size;
use crate::ml::{
    base::MolbertModel,
    metrics::{self, MetricError},
    model::BertConfig,
};

/// Model-specific arguments of a fine-tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinetuneHparams {
    pub train_file:              PathBuf,
    pub valid_file:              PathBuf,
    pub test_file:               PathBuf,
    pub max_seq_length:          usize,
    pub max_position_embeddings: usize,
    pub vocab_size:              Option<usize>,
    pub smiles_column:           String,
    pub label_column:            String,
    pub tiny:                    bool,
    pub mode:                    Mode,
    pub output_size:             usize,
    pub num_workers:             usize,
    pub masked_lm_probability:   f64,
    pub pretrained_model_path:   Option<PathBuf>,
    pub freeze_level:            i32,
}

pub struct FinetuneSmilesModel {
    pub hparams: FinetuneHparams,
}

impl FinetuneSmilesModel {
    pub fn new(hparams: FinetuneHparams) -> Self {
        Self { hparams }
    }

    fn dataset(
        &self,
        path:       &Path,
        featurizer: &SmilesFeaturizer,
        masking:    Option<Masking>,
    ) -> Result<SmilesDataset> {
        let source = CsvMoleculeSource::new(
            path,
            self.hparams.smiles_column.as_str(),
            self.hparams.label_column.as_str(),
        );
        SmilesDataset::load(&source, featurizer, masking)
    }
}

impl MolbertModel for FinetuneSmilesModel {
    fn get_config(&self) -> Result<BertConfig> {
        let h = &self.hparams;

        if h.max_seq_length > h.max_position_embeddings {
            bail!(
                "max_seq_length ({}) exceeds max_position_embeddings ({})",
                h.max_seq_length,
                h.max_position_embeddings
            );
        }
        match h.mode {
            Mode::Classification if h.output_size < 2 => {
                bail!("Classification needs output_size >= 2, got {}", h.output_size)
            }
            Mode::Regression if h.output_size != 1 => {
                bail!("Regression predicts a single value, got output_size {}", h.output_size)
            }
            _ => {}
        }

        let vocab_size = h.vocab_size.unwrap_or_else(smiles_vocab_size);
        if vocab_size < smiles_vocab_size() {
            bail!(
                "vocab_size ({}) is smaller than the SMILES vocabulary ({})",
                vocab_size,
                smiles_vocab_size()
            );
        }

        let (hidden, layers, heads, intermediate) = if h.tiny {
            (16, 2, 2, 32)
        } else {
            (768, 12, 12, 3072)
        };

        Ok(BertConfig::new(
            vocab_size,
            hidden,
            layers,
            heads,
            intermediate,
            h.max_position_embeddings,
            h.mode,
            h.output_size,
            h.label_column.clone(),
        ))
    }

    fn get_tasks(&self, config: &BertConfig) -> Vec<Task> {
        vec![Task::new(FINETUNE_TASK, config.mode, config.output_size, config.label_column.clone())]
    }

    fn load_datasets(&self, seed: u64) -> Result<DatasetSplits> {
        let h = &self.hparams;
        if !(0.0..=1.0).contains(&h.masked_lm_probability) {
            bail!("masked_lm_probability must be within [0, 1], got {}", h.masked_lm_probability);
        }
        let featurizer = SmilesFeaturizer::bert_smiles_index_featurizer(h.max_seq_length)?;
        let masking = Masking {
            probability: h.masked_lm_probability,
            vocab_size:  featurizer.vocab_size() as u32,
            seed,
        };

        let train = self.dataset(&h.train_file, &featurizer, Some(masking))?;
        let valid = self.dataset(&h.valid_file, &featurizer, Some(Masking { seed: seed.wrapping_add(1), ..masking }))?;
        let test  = self.dataset(&h.test_file, &featurizer, None)?;

        tracing::info!(
            "Datasets: {} train, {} valid, {} test molecules",
            train.sample_count(),
            valid.sample_count(),
            test.sample_count()
        );
        Ok(DatasetSplits { train, valid, test })
    }

    fn num_workers(&self) -> usize {
        self.hparams.num_workers
    }

    fn evaluate_metrics<B: Backend>(
        &self,
        labels:      Tensor<B, 2>,
        predictions: Tensor<B, 2>,
    ) -> Result<MetricsReport> {
        let targets = to_f32(labels)?;
        let mut report = MetricsReport::new();

        match self.hparams.mode {
            Mode::Classification => {
                let [n, _] = predictions.dims();
                let probs     = activation::softmax(predictions, 1);
                let predicted = to_i64(probs.clone().argmax(1))?;
                let positive  = to_f32(probs.slice([0..n, 1..2]))?;
                let classes   = metrics::binary_labels(&targets);

                let scored = |f: fn(&[i64], &[f32]) -> Result<f64, MetricError>| {
                    classes.clone().and_then(|c| f(&c, &positive))
                };
                let hard = |f: fn(&[i64], &[i64]) -> Result<f64, MetricError>| {
                    classes.clone().and_then(|c| f(&c, &predicted))
                };

                record(&mut report, "AUROC", scored(metrics::auroc));
                record(&mut report, "AveragePrecision", scored(metrics::average_precision));
                record(&mut report, "Accuracy", hard(metrics::accuracy));
                record(&mut report, "F1", hard(metrics::f1_score));
            }
            Mode::Regression => {
                let predicted = to_f32(predictions)?;
                record(&mut report, "MAE", metrics::mean_absolute_error(&targets, &predicted));
                record(&mut report, "RMSE", metrics::root_mean_squared_error(&targets, &predicted));
                record(&mut report, "MSE", metrics::mean_squared_error(&targets, &predicted));
                record(&mut report, "R2", metrics::r2_score(&targets, &predicted));
            }
        }

        Ok(report)
    }
}

/// Store a metric, or NaN with a log line when it is undefined.
fn record(report: &mut MetricsReport, name: &str, value: Result<f64, MetricError>) {
    match value {
        Ok(v) => report.insert(name, v),
        Err(e) => {
            tracing::info!("Unable to calculate {} metric: {}", name, e);
            report.insert(name, f64::NAN);
        }
    }
}

fn to_f32<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor values: {e:?}"))
}

fn to_i64<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor values: {e:?}"))
}
