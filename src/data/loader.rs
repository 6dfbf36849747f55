// ============================================================
// Layer 4 — CSV Molecule Loader
// ============================================================
// Reads labelled molecules from a CSV file with a header row.
//
// Two columns matter: the SMILES column (default "SMILES") and
// the label column named on the command line. Other columns are
// ignored. Whitespace around either value is trimmed.
//
//   SMILES,solubility,source
//   CCO,-0.77,esol          →  LabelledSmiles { "CCO", -0.77 }
//
// Missing columns are a hard error; a row whose label does not
// parse as a number is skipped with a warning.
//
// Reference: csv crate documentation (Reader::headers, records)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::domain::traits::{LabelledSmiles, MoleculeSource};

pub struct CsvMoleculeSource {
    path:          PathBuf,
    smiles_column: String,
    label_column:  String,
}

impl CsvMoleculeSource {
    pub fn new(
        path:          impl Into<PathBuf>,
        smiles_column: impl Into<String>,
        label_column:  impl Into<String>,
    ) -> Self {
        Self {
            path:          path.into(),
            smiles_column: smiles_column.into(),
            label_column:  label_column.into(),
        }
    }
}

impl MoleculeSource for CsvMoleculeSource {
    fn load_all(&self) -> Result<Vec<LabelledSmiles>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Cannot open '{}'", self.path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Cannot read header of '{}'", self.path.display()))?
            .clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .with_context(|| {
                    format!("Column '{}' not found in '{}'", name, self.path.display())
                })
        };
        let smiles_idx = column(&self.smiles_column)?;
        let label_idx  = column(&self.label_column)?;

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record
                .with_context(|| format!("Malformed row {} in '{}'", line + 2, self.path.display()))?;

            let smiles = record.get(smiles_idx).unwrap_or("").trim();
            let raw    = record.get(label_idx).unwrap_or("").trim();

            match raw.parse::<f32>() {
                Ok(label) => rows.push(LabelledSmiles { smiles: smiles.to_string(), label }),
                Err(_) => tracing::warn!(
                    "Skipping row {} of '{}': label '{}' is not a number",
                    line + 2,
                    self.path.display(),
                    raw
                ),
            }
        }

        tracing::debug!("Loaded {} rows from '{}'", rows.len(), self.path.display());
        Ok(rows)
    }
}
