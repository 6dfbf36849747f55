// ============================================================
// Layer 6 — Checkpoints
// ============================================================
// Everything that reads or writes model state on disk.
//
// Files under the run's root directory:
//   hparams.json             — resolved arguments of the run
//   checkpoint/model-N.mpk   — network weights after epoch N,
//                              written by Burn's learner
//   checkpoint/optim-N.mpk   — optimiser state (learner-owned)
//
// Two ways to load weights:
//
//   load_network        strict: the record must match the network
//                       exactly (used to evaluate a finished run)
//
//   load_model_weights  lenient: a checkpoint from another model
//                       (e.g. a pretraining run with masked-LM
//                       heads) donates whatever matches. The
//                       encoder is taken if its shape fits; task
//                       heads are taken when their output layer
//                       fits. Everything else is ignored.
//
// The lenient path works because CompactRecorder stores named
// fields: reading the file as PartialNetworkRecord skips unknown
// fields and yields None for missing ones.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Record, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::ml::model::{
    BertEncoderRecord, EncoderBlock, EncoderBlockRecord, MolbertNetwork, TaskHeadRecord,
};

/// The parts of a network record this crate knows how to reuse.
#[derive(Record)]
pub struct PartialNetworkRecord<B: Backend> {
    pub encoder: Option<BertEncoderRecord<B>>,
    pub heads:   Option<Vec<TaskHeadRecord<B>>>,
}

/// Directory where the learner writes its checkpoints.
pub fn checkpoint_dir(root: &Path) -> PathBuf {
    root.join("checkpoint")
}

/// Weights file written by the learner for `epoch`.
pub fn checkpoint_file(root: &Path, epoch: usize) -> PathBuf {
    checkpoint_dir(root).join(format!("model-{epoch}.mpk"))
}

// ─── Weights ──────────────────────────────────────────────────────────────────

/// Load a checkpoint that must match `network` exactly.
pub fn load_network<B: Backend>(
    network: MolbertNetwork<B>,
    path:    &Path,
    device:  &B::Device,
) -> Result<MolbertNetwork<B>> {
    tracing::info!("Loading checkpoint '{}'", path.display());

    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

    Ok(network.load_record(record))
}

/// Load whatever fits from a checkpoint into `network`.
pub fn load_model_weights<B: Backend>(
    mut network: MolbertNetwork<B>,
    path:        &Path,
    device:      &B::Device,
) -> Result<MolbertNetwork<B>> {
    tracing::info!("Loading model weights from '{}'", path.display());

    let record: PartialNetworkRecord<B> = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Cannot read weights from '{}'", path.display()))?;

    match record.encoder {
        Some(encoder) if encoder_fits(&network, &encoder) => {
            network.encoder = network.encoder.load_record(encoder);
            tracing::info!("Encoder weights loaded");
        }
        Some(_) => tracing::warn!("Encoder in checkpoint has a different shape; keeping initial weights"),
        None    => tracing::info!("No encoder weights in checkpoint"),
    }

    let Some(saved_heads) = record.heads else {
        tracing::info!("No task heads in checkpoint; heads keep their initial weights");
        return Ok(network);
    };

    let mut saved_heads = saved_heads.into_iter();
    network.heads = network
        .heads
        .into_iter()
        .enumerate()
        .map(|(i, head)| match saved_heads.next() {
            Some(saved) if saved.classifier.weight.val().dims() == head.classifier.weight.dims() => {
                tracing::info!("Task head {} loaded", i);
                head.load_record(saved)
            }
            Some(_) => {
                tracing::info!(
                    "Task head {} does not match the configured head (output size {}); skipped",
                    i,
                    head.output_size()
                );
                head
            }
            None => head,
        })
        .collect();

    Ok(network)
}

/// Every weight matrix of the saved encoder has the shape of the configured one.
fn encoder_fits<B: Backend>(network: &MolbertNetwork<B>, record: &BertEncoderRecord<B>) -> bool {
    let current = &network.encoder;
    record.layers.len() == current.layers.len()
        && record.token_embedding.weight.val().dims() == current.token_embedding.weight.dims()
        && record.position_embedding.weight.val().dims() == current.position_embedding.weight.dims()
        && record.embedding_norm.gamma.val().dims() == current.embedding_norm.gamma.dims()
        && record
            .layers
            .iter()
            .zip(&current.layers)
            .all(|(saved, block)| block_fits(saved, block))
}

fn block_fits<B: Backend>(saved: &EncoderBlockRecord<B>, block: &EncoderBlock<B>) -> bool {
    let attn = &saved.self_attn;
    [
        (attn.query.weight.val().dims(), block.self_attn.query.weight.dims()),
        (attn.key.weight.val().dims(), block.self_attn.key.weight.dims()),
        (attn.value.weight.val().dims(), block.self_attn.value.weight.dims()),
        (attn.output.weight.val().dims(), block.self_attn.output.weight.dims()),
        (saved.ffn_linear1.weight.val().dims(), block.ffn_linear1.weight.dims()),
        (saved.ffn_linear2.weight.val().dims(), block.ffn_linear2.weight.dims()),
    ]
    .iter()
    .all(|(a, b)| a == b)
        && saved.norm1.gamma.val().dims() == block.norm1.gamma.dims()
        && saved.norm2.gamma.val().dims() == block.norm2.gamma.dims()
}

// ─── Hyper-parameters ─────────────────────────────────────────────────────────

/// Write `<root>/hparams.json`.
pub fn save_hparams<T: Serialize>(root: &Path, hparams: &T) -> Result<PathBuf> {
    fs::create_dir_all(root)
        .with_context(|| format!("Cannot create '{}'", root.display()))?;

    let path = root.join("hparams.json");
    let json = serde_json::to_string_pretty(hparams)?;
    fs::write(&path, json)
        .with_context(|| format!("Cannot write hparams to '{}'", path.display()))?;

    tracing::debug!("Saved hparams to '{}'", path.display());
    Ok(path)
}

pub fn load_hparams<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| {
            format!(
                "Cannot read hparams from '{}'. Was the run trained with 'finetune'?",
                path.display()
            )
        })?;
    serde_json::from_str(&json)
        .with_context(|| format!("Malformed hparams in '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    use crate::domain::task::{Mode, Task, FINETUNE_TASK};
    use crate::ml::model::{BertConfig, BertEncoder};

    type TestBackend = NdArray<f32>;

    /// Stand-in for a pretraining network: same encoder, different heads.
    #[derive(Module, Debug)]
    struct PretrainingNetwork<B: Backend> {
        encoder:        BertEncoder<B>,
        masked_lm_head: Linear<B>,
    }

    fn config(layers: usize) -> BertConfig {
        BertConfig::new(42, 16, layers, 2, 32, 16, Mode::Classification, 2, "y".to_string())
    }

    fn config_with_ffn(intermediate: usize) -> BertConfig {
        BertConfig::new(42, 16, 2, 2, intermediate, 16, Mode::Classification, 2, "y".to_string())
    }

    fn network(cfg: &BertConfig, output_size: usize) -> MolbertNetwork<TestBackend> {
        let task = Task::new(FINETUNE_TASK, Mode::Classification, output_size, "y");
        MolbertNetwork::new(cfg, vec![task], &Default::default()).unwrap()
    }

    fn embedding_values(net: &MolbertNetwork<TestBackend>) -> Vec<f32> {
        net.encoder.token_embedding.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    fn close(a: &[f32], b: &[f32]) -> bool {
        // CompactRecorder stores half precision
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-2)
    }

    #[test]
    fn test_encoder_from_pretraining_checkpoint_is_loaded() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = config(2);

        let pretrained = PretrainingNetwork::<TestBackend> {
            encoder:        cfg.init_encoder(&device),
            masked_lm_head: LinearConfig::new(16, 42).init(&device),
        };
        let expected = pretrained.encoder.token_embedding.weight.val()
            .into_data().to_vec::<f32>().unwrap();
        let path = dir.path().join("pretrained");
        pretrained.save_file(path.clone(), &CompactRecorder::new()).unwrap();

        let fresh  = network(&cfg, 2);
        let before = embedding_values(&fresh);
        let loaded = load_model_weights(fresh, &dir.path().join("pretrained.mpk"), &device).unwrap();

        assert!(close(&embedding_values(&loaded), &expected));
        assert!(!close(&before, &expected));
    }

    #[test]
    fn test_head_with_other_output_size_is_skipped() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = config(2);

        let donor = network(&cfg, 3);
        donor.save_file(dir.path().join("donor"), &CompactRecorder::new()).unwrap();

        let target = network(&cfg, 2);
        let before = target.heads[0].classifier.weight.val().into_data().to_vec::<f32>().unwrap();
        let loaded = load_model_weights(target, &dir.path().join("donor.mpk"), &device).unwrap();
        let after  = loaded.heads[0].classifier.weight.val().into_data().to_vec::<f32>().unwrap();

        assert_eq!(before, after);
        assert_eq!(loaded.heads[0].output_size(), 2);
    }

    #[test]
    fn test_encoder_with_other_depth_is_ignored() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();

        let donor = network(&config(3), 2);
        donor.save_file(dir.path().join("deep"), &CompactRecorder::new()).unwrap();

        let target = network(&config(2), 2);
        let before = embedding_values(&target);
        let loaded = load_model_weights(target, &dir.path().join("deep.mpk"), &device).unwrap();

        assert_eq!(embedding_values(&loaded), before);
        assert_eq!(loaded.encoder.layers.len(), 2);
    }

    #[test]
    fn test_encoder_with_other_ffn_width_is_ignored() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();

        let donor = network(&config_with_ffn(64), 2);
        donor.save_file(dir.path().join("wide"), &CompactRecorder::new()).unwrap();

        let target = network(&config_with_ffn(32), 2);
        let before = embedding_values(&target);
        let loaded = load_model_weights(target, &dir.path().join("wide.mpk"), &device).unwrap();

        assert_eq!(embedding_values(&loaded), before);
        for block in &loaded.encoder.layers {
            assert_eq!(block.ffn_linear1.weight.dims(), [16, 32]);
            assert_eq!(block.ffn_linear2.weight.dims(), [32, 16]);
        }
    }

    #[test]
    fn test_strict_load_restores_everything() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = config(2);

        let trained = network(&cfg, 2);
        let expected = embedding_values(&trained);
        trained.save_file(dir.path().join("model-1"), &CompactRecorder::new()).unwrap();

        let loaded = load_network(network(&cfg, 2), &dir.path().join("model-1.mpk"), &device).unwrap();
        assert!(close(&embedding_values(&loaded), &expected));
    }

    #[test]
    fn test_hparams_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let path = save_hparams(dir.path(), &serde_json::json!({"seed": 42})).unwrap();
        let back: serde_json::Value = load_hparams(&path).unwrap();
        assert_eq!(back["seed"], 42);
    }

    #[test]
    fn test_checkpoint_paths() {
        let root = Path::new("artifacts");
        assert_eq!(checkpoint_file(root, 3), Path::new("artifacts/checkpoint/model-3.mpk"));
    }
}
