// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds the SMILES vocabulary as a HuggingFace tokenizer and
// writes it next to the run's artifacts.
//
// The tokenizer JSON is assembled by hand, as a word-level model
// over a fixed vocabulary. A `Split` pre-tokenizer isolates the
// two-letter halogens (Cl, Br) and otherwise cuts the SMILES into
// single characters; anything outside the vocabulary maps to
// [UNK].
//
// Vocabulary (42 entries):
//   0..=4   [PAD] [UNK] [CLS] [SEP] [MASK]
//   5..=15  C N O S P F I B H Cl Br
//   16..=20 c n o s p                    (aromatic atoms)
//   21..=32 ( ) [ ] = # - + / \ @ .      (branches, bonds, charges)
//   33..=41 1 2 3 4 5 6 7 8 9            (ring closures, counts)
//
// Reference: Schwaller et al. (2019) Molecular Transformer, SMILES
//            tokenisation

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokenizers::Tokenizer;

pub const PAD_TOKEN:  &str = "[PAD]";
pub const UNK_TOKEN:  &str = "[UNK]";
pub const CLS_TOKEN:  &str = "[CLS]";
pub const SEP_TOKEN:  &str = "[SEP]";
pub const MASK_TOKEN: &str = "[MASK]";

pub const SPECIAL_TOKENS: [&str; 5] = [PAD_TOKEN, UNK_TOKEN, CLS_TOKEN, SEP_TOKEN, MASK_TOKEN];

pub const SMILES_TOKENS: [&str; 37] = [
    "C", "N", "O", "S", "P", "F", "I", "B", "H", "Cl", "Br",
    "c", "n", "o", "s", "p",
    "(", ")", "[", "]", "=", "#", "-", "+", "/", "\\", "@", ".",
    "1", "2", "3", "4", "5", "6", "7", "8", "9",
];

/// Multi-character atoms must come before the single-character fallback.
const SMILES_SPLIT_PATTERN: &str = "Cl|Br|.";

/// Number of entries in the SMILES vocabulary.
pub fn smiles_vocab_size() -> usize {
    SPECIAL_TOKENS.len() + SMILES_TOKENS.len()
}

/// Build the SMILES word-level tokenizer in memory.
pub fn smiles_tokenizer() -> Result<Tokenizer> {
    smiles_tokenizer_json()
        .to_string()
        .parse::<Tokenizer>()
        .map_err(|e| anyhow::anyhow!("Cannot build SMILES tokenizer: {e}"))
}

fn smiles_tokenizer_json() -> serde_json::Value {
    let mut vocab = serde_json::Map::new();
    for (id, token) in SPECIAL_TOKENS.iter().chain(SMILES_TOKENS.iter()).enumerate() {
        vocab.insert(token.to_string(), serde_json::json!(id));
    }

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| {
            serde_json::json!({
                "id": id,
                "content": token,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        })
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": {
            "type": "Split",
            "pattern": { "Regex": SMILES_SPLIT_PATTERN },
            "behavior": "Isolated",
            "invert": false
        },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNK_TOKEN
        }
    })
}

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Write the tokenizer as pretty JSON, creating the directory if needed.
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let path = self.path();
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {e}", path.display()))?;

        tracing::debug!("Tokenizer saved to '{}'", path.display());
        Ok(path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(smiles: &str) -> Vec<String> {
        let tok = smiles_tokenizer().unwrap();
        tok.encode(smiles, false).unwrap().get_tokens().to_vec()
    }

    #[test]
    fn test_vocab_has_42_entries() {
        assert_eq!(smiles_vocab_size(), 42);
        let tok = smiles_tokenizer().unwrap();
        assert_eq!(tok.get_vocab_size(true), 42);
    }

    #[test]
    fn test_special_token_ids_are_fixed() {
        let tok = smiles_tokenizer().unwrap();
        assert_eq!(tok.token_to_id(PAD_TOKEN), Some(0));
        assert_eq!(tok.token_to_id(CLS_TOKEN), Some(2));
        assert_eq!(tok.token_to_id(MASK_TOKEN), Some(4));
    }

    #[test]
    fn test_halogens_are_single_tokens() {
        assert_eq!(tokens("ClCBr"), vec!["Cl", "C", "Br"]);
    }

    #[test]
    fn test_aromatic_ring_is_split_per_character() {
        assert_eq!(tokens("c1ccccc1").len(), 8);
    }

    #[test]
    fn test_unknown_symbol_maps_to_unk() {
        let tok = smiles_tokenizer().unwrap();
        let enc = tok.encode("C%10", false).unwrap();
        assert_eq!(enc.get_ids()[1], 1);
    }

    #[test]
    fn test_save_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let path = store.save(&smiles_tokenizer().unwrap()).unwrap();

        let reloaded = Tokenizer::from_file(&path).unwrap();
        assert_eq!(reloaded.get_vocab_size(true), 42);
    }
}
