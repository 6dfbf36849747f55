// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The data layer reads labelled molecules from a source. Today
// that is a CSV file; the dataset builder only sees the trait.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

/// One raw input row: a SMILES string and its property value.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledSmiles {
    pub smiles: String,
    pub label:  f32,
}

// ─── MoleculeSource ───────────────────────────────────────────────────────────
/// Any component that can produce labelled SMILES rows.
///
/// Implementations:
///   - CsvMoleculeSource → reads a SMILES column and a label column
pub trait MoleculeSource {
    /// Load all rows in file order.
    fn load_all(&self) -> Result<Vec<LabelledSmiles>>;
}
