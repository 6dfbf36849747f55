// ============================================================
// Layer 4 — SMILES Featurizer
// ============================================================
// Turns one SMILES string into a fixed-length sequence of token
// IDs the encoder can consume:
//
//   "CCO"  →  [CLS] C C O [SEP] [PAD] [PAD] ...
//
// Sequences that do not fit into `max_length` (including the two
// special tokens) are reported as invalid instead of being cut.
//
// Reference: tokenizers crate documentation (Tokenizer::encode)

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::infra::tokenizer_store::{smiles_tokenizer, smiles_vocab_size};

pub const PAD_ID:  u32 = 0;
pub const CLS_ID:  u32 = 2;
pub const SEP_ID:  u32 = 3;
pub const MASK_ID: u32 = 4;

/// First ID that belongs to a real SMILES token.
pub const FIRST_REGULAR_ID: u32 = 5;

/// Result of featurizing one SMILES.
#[derive(Debug, Clone, PartialEq)]
pub struct Featurized {
    /// Always exactly `max_length` IDs; all [PAD] when invalid
    pub input_ids: Vec<u32>,
    pub valid:     bool,
}

#[derive(Clone)]
pub struct SmilesFeaturizer {
    tokenizer:  Tokenizer,
    max_length: usize,
}

impl SmilesFeaturizer {
    pub fn new(tokenizer: Tokenizer, max_length: usize) -> Self {
        Self { tokenizer, max_length }
    }

    /// Index featurizer over the built-in SMILES vocabulary.
    pub fn bert_smiles_index_featurizer(max_length: usize) -> Result<Self> {
        Ok(Self::new(smiles_tokenizer()?, max_length))
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn vocab_size(&self) -> usize {
        smiles_vocab_size()
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Featurize a single SMILES string.
    pub fn transform(&self, smiles: &str) -> Result<Featurized> {
        let encoding = self
            .tokenizer
            .encode(smiles, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation failed for '{smiles}': {e}"))?;
        let ids = encoding.get_ids();

        if smiles.is_empty() || ids.len() + 2 > self.max_length {
            return Ok(Featurized {
                input_ids: vec![PAD_ID; self.max_length],
                valid:     false,
            });
        }

        let mut input_ids = Vec::with_capacity(self.max_length);
        input_ids.push(CLS_ID);
        input_ids.extend_from_slice(ids);
        input_ids.push(SEP_ID);
        input_ids.resize(self.max_length, PAD_ID);

        Ok(Featurized { input_ids, valid: true })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethanol_is_wrapped_and_padded() {
        let f   = SmilesFeaturizer::bert_smiles_index_featurizer(8).unwrap();
        let out = f.transform("CCO").unwrap();

        assert!(out.valid);
        assert_eq!(out.input_ids.len(), 8);
        assert_eq!(out.input_ids[0], CLS_ID);
        assert_eq!(out.input_ids[4], SEP_ID);
        assert!(out.input_ids[5..].iter().all(|&id| id == PAD_ID));
        assert!(out.input_ids[1..4].iter().all(|&id| id >= FIRST_REGULAR_ID));
    }

    #[test]
    fn test_exact_fit_is_valid() {
        let f = SmilesFeaturizer::bert_smiles_index_featurizer(5).unwrap();
        assert!(f.transform("CCO").unwrap().valid);
    }

    #[test]
    fn test_too_long_is_invalid() {
        let f   = SmilesFeaturizer::bert_smiles_index_featurizer(4).unwrap();
        let out = f.transform("CCO").unwrap();
        assert!(!out.valid);
        assert_eq!(out.input_ids, vec![PAD_ID; 4]);
    }

    #[test]
    fn test_empty_smiles_is_invalid() {
        let f = SmilesFeaturizer::bert_smiles_index_featurizer(8).unwrap();
        assert!(!f.transform("").unwrap().valid);
    }

    #[test]
    fn test_chlorine_counts_as_one_token() {
        let f   = SmilesFeaturizer::bert_smiles_index_featurizer(4).unwrap();
        let out = f.transform("CCl").unwrap();
        assert!(out.valid);
        assert_eq!(out.input_ids[3], SEP_ID);
    }
}
