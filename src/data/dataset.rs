// ============================================================
// Layer 4 — SMILES Dataset
// ============================================================
// Implements Burn's Dataset trait over featurized molecules.
//
// Train and validation splits carry a Masking setting and corrupt
// tokens on every access, BERT style:
//
//   each regular token with probability p:
//     80% → [MASK]
//     10% → random regular token
//     10% → unchanged
//
// [CLS], [SEP] and [PAD] are never touched. The test split has no
// Masking (inference mode) and returns samples as stored.
//
// Reference: Burn Book §4 (Dataset trait)
//            Devlin et al. (2019) BERT, §3.1

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::featurizer::{SmilesFeaturizer, FIRST_REGULAR_ID, MASK_ID};
use crate::domain::traits::MoleculeSource;

/// One featurized molecule.
/// Sequence format: [CLS] smiles tokens [SEP] [PAD]...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmilesSample {
    pub input_ids: Vec<u32>,
    pub label:     f32,
    pub valid:     bool,
}

impl SmilesSample {
    /// Number of non-padding tokens, special tokens included.
    pub fn token_count(&self) -> usize {
        self.input_ids.iter().filter(|&&id| id != 0).count()
    }
}

/// BERT-style corruption applied on access.
#[derive(Debug, Clone, Copy)]
pub struct Masking {
    pub probability: f64,
    pub vocab_size:  u32,
    pub seed:        u64,
}

pub struct SmilesDataset {
    samples: Vec<SmilesSample>,
    masking: Option<Masking>,
    draws:   AtomicU64,
}

impl SmilesDataset {
    /// `masking: None` is inference mode; samples come back untouched.
    pub fn new(samples: Vec<SmilesSample>, masking: Option<Masking>) -> Self {
        Self { samples, masking, draws: AtomicU64::new(0) }
    }

    /// Read every row from `source`, featurize it and keep the valid ones.
    pub fn load(
        source:     &dyn MoleculeSource,
        featurizer: &SmilesFeaturizer,
        masking:    Option<Masking>,
    ) -> Result<Self> {
        let rows = source.load_all()?;
        let total = rows.len();

        let mut samples = Vec::with_capacity(total);
        for row in rows {
            let featurized = featurizer.transform(&row.smiles)?;
            if !featurized.valid {
                tracing::warn!(
                    "Dropping SMILES '{}': empty or longer than {} tokens",
                    row.smiles,
                    featurizer.max_length()
                );
                continue;
            }
            samples.push(SmilesSample {
                input_ids: featurized.input_ids,
                label:     row.label,
                valid:     true,
            });
        }

        tracing::debug!(
            "Longest molecule: {} tokens",
            samples.iter().map(SmilesSample::token_count).max().unwrap_or(0)
        );
        if samples.len() < total {
            tracing::info!("Kept {} of {} molecules", samples.len(), total);
        }
        let dataset = Self::new(samples, masking);
        if dataset.is_inference_mode() {
            tracing::debug!("No token masking; samples are served as featurized");
        }
        Ok(dataset)
    }

    pub fn is_inference_mode(&self) -> bool {
        self.masking.is_none()
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    /// Keep only the first `n` samples.
    pub fn truncate(&mut self, n: usize) {
        self.samples.truncate(n);
    }

    fn mask_tokens(&self, masking: &Masking, index: usize, input_ids: &mut [u32]) {
        let draw = self.draws.fetch_add(1, Ordering::Relaxed);
        let mut rng = StdRng::seed_from_u64(
            masking.seed
                ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ draw.rotate_left(32),
        );

        for id in input_ids.iter_mut().filter(|id| **id >= FIRST_REGULAR_ID) {
            if !rng.gen_bool(masking.probability) {
                continue;
            }
            let roll: f64 = rng.gen();
            if roll < 0.8 {
                *id = MASK_ID;
            } else if roll < 0.9 {
                *id = rng.gen_range(FIRST_REGULAR_ID..masking.vocab_size);
            }
        }
    }
}

impl Dataset<SmilesSample> for SmilesDataset {
    fn get(&self, index: usize) -> Option<SmilesSample> {
        let mut sample = self.samples.get(index).cloned()?;
        if let Some(masking) = &self.masking {
            self.mask_tokens(masking, index, &mut sample.input_ids);
        }
        Some(sample)
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// The three splits of a fine-tuning run.
pub struct DatasetSplits {
    pub train: SmilesDataset,
    pub valid: SmilesDataset,
    pub test:  SmilesDataset,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::featurizer::{CLS_ID, PAD_ID, SEP_ID};
    use crate::domain::traits::LabelledSmiles;

    struct FixedSource(Vec<LabelledSmiles>);

    impl MoleculeSource for FixedSource {
        fn load_all(&self) -> Result<Vec<LabelledSmiles>> {
            Ok(self.0.clone())
        }
    }

    fn row(smiles: &str, label: f32) -> LabelledSmiles {
        LabelledSmiles { smiles: smiles.into(), label }
    }

    fn sample(len: usize) -> SmilesSample {
        let mut ids = vec![CLS_ID];
        ids.extend(std::iter::repeat(FIRST_REGULAR_ID).take(len));
        ids.push(SEP_ID);
        ids.resize(len + 4, PAD_ID);
        SmilesSample { input_ids: ids, label: 1.0, valid: true }
    }

    #[test]
    fn test_invalid_rows_are_dropped_at_load() {
        let source = FixedSource(vec![row("CCO", 0.1), row("CCCCCCCCCCCC", 0.2), row("N", 0.3)]);
        let f      = SmilesFeaturizer::bert_smiles_index_featurizer(6).unwrap();
        let ds     = SmilesDataset::load(&source, &f, None).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().label, 0.3);
        assert!(ds.get(0).unwrap().valid);
    }

    #[test]
    fn test_inference_mode_returns_samples_unchanged() {
        let s  = sample(10);
        let ds = SmilesDataset::new(vec![s.clone()], None);
        assert!(ds.is_inference_mode());
        assert_eq!(ds.get(0).unwrap(), s);
        assert_eq!(ds.get(0).unwrap(), s);
    }

    #[test]
    fn test_full_masking_never_touches_special_tokens() {
        let masking = Masking { probability: 1.0, vocab_size: 42, seed: 7 };
        let ds      = SmilesDataset::new(vec![sample(50)], Some(masking));
        let out     = ds.get(0).unwrap();

        assert_eq!(out.input_ids[0], CLS_ID);
        assert_eq!(out.input_ids[51], SEP_ID);
        assert!(out.input_ids[52..].iter().all(|&id| id == PAD_ID));
        assert!(out.input_ids[1..51].iter().all(|&id| id >= MASK_ID && id < 42));
        assert!(out.input_ids[1..51].contains(&MASK_ID));
    }

    #[test]
    fn test_zero_probability_leaves_tokens_alone() {
        let masking = Masking { probability: 0.0, vocab_size: 42, seed: 7 };
        let s       = sample(20);
        let ds      = SmilesDataset::new(vec![s.clone()], Some(masking));
        assert_eq!(ds.get(0).unwrap(), s);
    }

    #[test]
    fn test_truncate_keeps_leading_samples() {
        let mut ds = SmilesDataset::new(vec![sample(1), sample(2), sample(3)], None);
        ds.truncate(2);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().token_count(), 4);
    }
}
