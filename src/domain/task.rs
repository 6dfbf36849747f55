// ============================================================
// Layer 3 — Task Domain Types
// ============================================================
// A fine-tuning run trains the shared encoder on one or more
// named tasks. Each task knows its operating mode, how many
// output values it predicts, and which CSV column holds its
// label. The ML layer builds one output head per task and picks
// the loss from the mode.
//
// Reference: Devlin et al. (2019) BERT paper, §4 (Fine-tuning)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the single task used when fine-tuning on a property.
pub const FINETUNE_TASK: &str = "finetune";

/// Selects which loss and metric family applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Binary classification from two output logits
    Classification,
    /// Scalar regression
    Regression,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Classification => write!(f, "classification"),
            Mode::Regression     => write!(f, "regression"),
        }
    }
}

/// A named unit of work the model is trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name:         String,
    pub mode:         Mode,
    pub output_size:  usize,
    pub label_column: String,
}

impl Task {
    pub fn new(
        name:         impl Into<String>,
        mode:         Mode,
        output_size:  usize,
        label_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            output_size,
            label_column: label_column.into(),
        }
    }

    pub fn is_classification(&self) -> bool {
        self.mode == Mode::Classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display_matches_serde_name() {
        let json = serde_json::to_string(&Mode::Regression).unwrap();
        assert_eq!(json, format!("\"{}\"", Mode::Regression));
    }

    #[test]
    fn test_task_classification_flag() {
        let t = Task::new(FINETUNE_TASK, Mode::Classification, 2, "label");
        assert!(t.is_classification());
        assert_eq!(t.name, "finetune");
    }
}
