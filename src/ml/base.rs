// ============================================================
// Layer 5 — Model Hooks
// ============================================================
// A MolbertModel describes one kind of training run: which
// encoder configuration to build, which tasks sit on top of it,
// where the data comes from, and how test predictions are
// scored. The network itself is always a MolbertNetwork; only
// these hooks differ between models.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use burn::prelude::*;

use crate::data::dataset::DatasetSplits;
use crate::domain::{metrics_report::MetricsReport, task::Task};
use crate::ml::model::{BertConfig, MolbertNetwork};

pub trait MolbertModel {
    /// Encoder and head configuration for this run.
    fn get_config(&self) -> Result<BertConfig>;

    /// Tasks trained on top of the encoder, in head order.
    fn get_tasks(&self, config: &BertConfig) -> Vec<Task>;

    /// Train, validation and test splits. `seed` drives token masking.
    fn load_datasets(&self, seed: u64) -> Result<DatasetSplits>;

    /// Loader threads for the train and validation splits.
    fn num_workers(&self) -> usize;

    /// Score the concatenated test predictions against their labels.
    fn evaluate_metrics<B: Backend>(
        &self,
        labels:      Tensor<B, 2>,
        predictions: Tensor<B, 2>,
    ) -> Result<MetricsReport>;

    /// Build the network from the config and task hooks; the task
    /// list becomes the network's head modules so their parameters
    /// are trained.
    fn build_network<B: Backend>(&self, device: &B::Device) -> Result<MolbertNetwork<B>> {
        let config = self.get_config()?;
        let tasks  = self.get_tasks(&config);
        tracing::debug!(
            "Building network: hidden={}, layers={}, tasks={}",
            config.hidden_size,
            config.num_hidden_layers,
            tasks.len()
        );
        MolbertNetwork::new(&config, tasks, device)
    }
}
