// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what a fine-tuning run works with:
//
//   task.rs           — the operating mode (classification or
//                       regression) and the named unit of work
//                       the model is trained on
//   metrics_report.rs — the ordered metric-name → value mapping
//                       produced at the end of a test epoch
//   traits.rs         — the source abstraction for labelled
//                       SMILES rows
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Operating mode and task descriptors
pub mod task;

// Test-set metrics mapping with NaN-tolerant JSON form
pub mod metrics_report;

// Core abstractions (traits) that other layers implement
pub mod traits;
