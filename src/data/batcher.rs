// ============================================================
// Layer 4 — SMILES Batcher
// ============================================================
// Implements Burn's Batcher trait to stack SmilesSamples into
// tensors for the encoder.
//
//   Input:  Vec of N SmilesSamples, each with S token IDs
//   Output: SmilesBatch with input_ids [N, S], labels [N, 1]
//
// All samples are already padded to the same length by the
// featurizer, so stacking is a flatten + reshape:
//   [s1_t1, ..., s1_tS, s2_t1, ..., sN_tS] → [N, S]
//
// The padding mask is derived here once (true = [PAD]) so the
// encoder does not recompute it per layer.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::SmilesSample;
use crate::data::featurizer::PAD_ID;

// ─── Batch Types ──────────────────────────────────────────────────────────────
/// What the encoder reads.
#[derive(Debug, Clone)]
pub struct BatchInputs<B: Backend> {
    /// Token ID sequences — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// true where the token is [PAD] — shape: [batch_size, seq_len]
    pub padding_mask: Tensor<B, 2, Bool>,
}

/// A batch of molecules ready for the forward pass.
#[derive(Debug, Clone)]
pub struct SmilesBatch<B: Backend> {
    pub inputs: BatchInputs<B>,

    /// Property values — shape: [batch_size, 1]
    pub labels: Tensor<B, 2>,

    /// Per-example validity; all true once invalid rows are dropped
    pub valid: Vec<bool>,
}

impl<B: Backend> SmilesBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.valid.len()
    }
}

// ─── SmilesBatcher ────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct SmilesBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SmilesBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SmilesSample, SmilesBatch<B>> for SmilesBatcher<B> {
    fn batch(&self, items: Vec<SmilesSample>) -> SmilesBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map(|s| s.input_ids.len()).unwrap_or(0);

        let ids_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();

        let labels: Vec<f32> = items.iter().map(|s| s.label).collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(
            ids_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        let padding_mask = input_ids.clone().equal_elem(PAD_ID as i32);

        let labels = Tensor::<B, 1>::from_floats(
            labels.as_slice(), &self.device
        ).reshape([batch_size, 1]);

        SmilesBatch {
            inputs: BatchInputs { input_ids, padding_mask },
            labels,
            valid: items.iter().map(|s| s.valid).collect(),
        }
    }
}
