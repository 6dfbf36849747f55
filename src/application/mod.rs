// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one training application.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Shared bootstrap: trainer settings and the MolbertApp trait
pub mod app;

// Fine-tuning on a SMILES property, plus checkpoint evaluation
pub mod finetune_app;
