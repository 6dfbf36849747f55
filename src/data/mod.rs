// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a CSV file and a tensor batch:
//
//   train.csv / valid.csv / test.csv
//       │
//       ▼
//   CsvMoleculeSource  → SMILES + label per row
//       │
//       ▼
//   SmilesFeaturizer   → [CLS] tokens [SEP] [PAD]... (or invalid)
//       │
//       ▼
//   SmilesDataset      → Burn Dataset; masks tokens outside
//       │                 inference mode
//       ▼
//   SmilesBatcher      → stacks samples into tensors
//       │
//       ▼
//   DataLoader         → feeds batches to the learner
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads SMILES and labels from CSV files
pub mod loader;

/// SMILES → padded token IDs
pub mod featurizer;

/// Implements Burn's Dataset trait for featurized molecules
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
