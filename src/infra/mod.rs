// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Files on disk that outlive a single process:
//
//   checkpoint.rs      — Model weights and hparams.json
//                        Strict and partial loading of Burn
//                        CompactRecorder checkpoints.
//
//   tokenizer_store.rs — The SMILES vocabulary as a HuggingFace
//                        tokenizer, saved as tokenizer.json.
//
//   report.rs          — metrics.json next to the evaluated
//                        checkpoint.
//
//   tracking.rs        — Optional per-run experiment directory
//                        with hparams and a metrics CSV.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint and hparams loading
pub mod checkpoint;

/// SMILES tokenizer construction and persistence
pub mod tokenizer_store;

/// Test metrics report file
pub mod report;

/// Experiment tracking CSV logger
pub mod tracking;
