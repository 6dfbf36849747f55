// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn model code and the hooks that
// tell the training bootstrap what to build and how to score it.
//
// What's in this layer:
//
//   model.rs     — BERT-style SMILES encoder + one head per task
//                  • Token and positional embeddings
//                  • Multi-head self-attention blocks
//                  • Pooler + classifier per task
//                  • Per-task losses, freezing by level
//
//   base.rs      — MolbertModel: the hooks every model provides
//                  (config, tasks, datasets, metrics)
//
//   finetune.rs  — Fine-tuning hooks for one SMILES property
//
//   metrics.rs   — AUROC, AP, accuracy, F1, MAE, RMSE, MSE, R²
//
//   trainer.rs   — Learner wiring (optimizer, checkpoints, devices)
//
//   tester.rs    — Test epoch: accumulate, aggregate, metrics.json
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT

/// Encoder, task heads and the full network
pub mod model;

/// Model hooks shared by every application
pub mod base;

/// Fine-tuning on a single SMILES property
pub mod finetune;

/// Test-set metrics over plain slices
pub mod metrics;

/// Burn Learner configuration and fit
pub mod trainer;

/// Test epoch with whole-split aggregation
pub mod tester;
