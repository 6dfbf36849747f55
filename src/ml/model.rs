// ============================================================
// Layer 5 — SMILES BERT Network
// ============================================================
// A BERT-style encoder over SMILES tokens with one output head
// per task.
//
//   input_ids [N, S]
//       │  token embedding + position embedding → LayerNorm
//       ▼
//   EncoderBlock × num_hidden_layers   (self-attention + FFN,
//       │                               padding positions masked)
//       ▼
//   sequence output [N, S, H]
//       │  per task: [CLS] vector → pooler (tanh) → classifier
//       ▼
//   predictions [N, output_size]
//
// Classification heads emit logits and train with cross-entropy;
// regression heads emit the value and train with MSE. The
// training loss is the sum over tasks.
//
// Encoder blocks are kept as a Vec so individual blocks can be
// frozen when fine-tuning on small datasets.
//
// Reference: Burn Book §3 (Building Blocks), §5 (Learner)
//            Devlin et al. (2019) BERT

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use burn::{
    module::Ignored,
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::{CrossEntropyLossConfig, MseLoss, Reduction},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
    train::{RegressionOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::data::batcher::{BatchInputs, SmilesBatch};
use crate::domain::task::{Mode, Task};

/// Task name → tensor, e.g. predictions or labels per task.
pub type TaskTensors<B> = BTreeMap<String, Tensor<B, 2>>;

// ─── Configuration ────────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct BertConfig {
    pub vocab_size:              usize,
    pub hidden_size:             usize,
    pub num_hidden_layers:       usize,
    pub num_attention_heads:     usize,
    pub intermediate_size:       usize,
    pub max_position_embeddings: usize,
    pub mode:                    Mode,
    pub output_size:             usize,
    pub label_column:            String,
    #[config(default = 0.1)]
    pub hidden_dropout_prob:     f64,
}

impl BertConfig {
    pub fn init_encoder<B: Backend>(&self, device: &B::Device) -> BertEncoder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size).init(device);
        let embedding_norm     = LayerNormConfig::new(self.hidden_size).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_hidden_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let dropout = DropoutConfig::new(self.hidden_dropout_prob).init();
        BertEncoder { token_embedding, position_embedding, embedding_norm, layers, dropout }
    }

    pub fn init_head<B: Backend>(&self, task: &Task, device: &B::Device) -> TaskHead<B> {
        TaskHead {
            pooler:     LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            dropout:    DropoutConfig::new(self.hidden_dropout_prob).init(),
            classifier: LinearConfig::new(self.hidden_size, task.output_size).init(device),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.hidden_size, self.num_attention_heads)
            .with_dropout(self.hidden_dropout_prob)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.hidden_size, self.intermediate_size).init(device);
        let ffn_linear2 = LinearConfig::new(self.intermediate_size, self.hidden_size).init(device);
        let norm1   = LayerNormConfig::new(self.hidden_size).init(device);
        let norm2   = LayerNormConfig::new(self.hidden_size).init(device);
        let dropout = DropoutConfig::new(self.hidden_dropout_prob).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

// ─── Encoder ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, padding_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(padding_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct BertEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub embedding_norm:     LayerNorm<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub dropout:            Dropout,
}

impl<B: Backend> BertEncoder<B> {
    /// input_ids: [batch, seq_len] → sequence output [batch, seq_len, hidden]
    pub fn forward(&self, inputs: BatchInputs<B>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = inputs.input_ids.dims();

        let tok_emb   = self.token_embedding.forward(inputs.input_ids);
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(self.embedding_norm.forward(tok_emb + pos_emb));
        for layer in &self.layers {
            x = layer.forward(x, inputs.padding_mask.clone());
        }
        x
    }

    /// Stop gradients for the embeddings and every block except the last `keep`.
    fn freeze_all_but(mut self, keep: usize) -> Self {
        self.token_embedding    = self.token_embedding.no_grad();
        self.position_embedding = self.position_embedding.no_grad();
        self.embedding_norm     = self.embedding_norm.no_grad();

        let frozen = self.layers.len().saturating_sub(keep);
        self.layers = self
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| if i < frozen { layer.no_grad() } else { layer })
            .collect();
        self
    }
}

// ─── Task Head ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TaskHead<B: Backend> {
    pub pooler:     Linear<B>,
    pub dropout:    Dropout,
    pub classifier: Linear<B>,
}

impl<B: Backend> TaskHead<B> {
    /// sequence output [batch, seq_len, hidden] → [batch, output_size]
    pub fn forward(&self, sequence_output: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, _, hidden] = sequence_output.dims();
        let cls = sequence_output
            .slice([0..batch_size, 0..1, 0..hidden])
            .reshape([batch_size, hidden]);
        let pooled = activation::tanh(self.pooler.forward(cls));
        self.classifier.forward(self.dropout.forward(pooled))
    }

    pub fn output_size(&self) -> usize {
        self.classifier.weight.dims()[1]
    }
}

// ─── Full Network ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct MolbertNetwork<B: Backend> {
    pub encoder: BertEncoder<B>,
    /// One head per task, in task order
    pub heads:   Vec<TaskHead<B>>,
    pub tasks:   Ignored<Vec<Task>>,
}

impl<B: Backend> MolbertNetwork<B> {
    pub fn new(config: &BertConfig, tasks: Vec<Task>, device: &B::Device) -> Result<Self> {
        if tasks.is_empty() {
            bail!("A network needs at least one task");
        }
        let encoder = config.init_encoder(device);
        let heads   = tasks.iter().map(|t| config.init_head(t, device)).collect();
        Ok(Self { encoder, heads, tasks: Ignored(tasks) })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks.0
    }

    /// Predictions for every task, keyed by task name.
    pub fn forward(&self, inputs: BatchInputs<B>) -> TaskTensors<B> {
        let sequence_output = self.encoder.forward(inputs);
        self.tasks()
            .iter()
            .zip(&self.heads)
            .map(|(task, head)| (task.name.clone(), head.forward(sequence_output.clone())))
            .collect()
    }

    /// Per-task loss, in task order. Every task must be present in
    /// both `labels` and `predictions`.
    pub fn evaluate_losses(
        &self,
        labels:      &TaskTensors<B>,
        predictions: &TaskTensors<B>,
    ) -> Result<Vec<(String, Tensor<B, 1>)>> {
        self.tasks()
            .iter()
            .map(|task| {
                let label = labels
                    .get(&task.name)
                    .with_context(|| format!("No labels for task '{}'", task.name))?;
                let prediction = predictions
                    .get(&task.name)
                    .with_context(|| format!("No predictions for task '{}'", task.name))?;
                Ok((task.name.clone(), task_loss(task, prediction.clone(), label.clone())))
            })
            .collect()
    }

    /// Forward pass plus summed task loss for the learner.
    pub fn forward_step(&self, batch: SmilesBatch<B>) -> RegressionOutput<B> {
        let sequence_output = self.encoder.forward(batch.inputs);

        let mut losses  = Vec::with_capacity(self.heads.len());
        let mut outputs = Vec::with_capacity(self.heads.len());
        for (task, head) in self.tasks().iter().zip(&self.heads) {
            let prediction = head.forward(sequence_output.clone());
            losses.push(task_loss(task, prediction.clone(), batch.labels.clone()));
            outputs.push(prediction);
        }

        let loss = Tensor::cat(losses, 0).sum();
        RegressionOutput::new(loss, Tensor::cat(outputs, 1), batch.labels)
    }

    /// Apply a freeze level.
    ///
    /// *  0 → everything trains
    /// * -1 → embeddings and all encoder blocks frozen
    /// * -2 → additionally the heads' poolers; only the output layers train
    /// *  n → embeddings and all but the last n encoder blocks frozen
    pub fn freeze(mut self, level: i32) -> Self {
        match level {
            0 => {}
            -1 => self.encoder = self.encoder.freeze_all_but(0),
            l if l < -1 => {
                self.encoder = self.encoder.freeze_all_but(0);
                self.heads = self
                    .heads
                    .into_iter()
                    .map(|mut h| {
                        h.pooler = h.pooler.no_grad();
                        h
                    })
                    .collect();
            }
            n => self.encoder = self.encoder.freeze_all_but(n as usize),
        }
        self
    }
}

fn task_loss<B: Backend>(task: &Task, prediction: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    if task.is_classification() {
        let targets = labels.flatten::<1>(0, 1).int();
        CrossEntropyLossConfig::new()
            .init(&prediction.device())
            .forward(prediction, targets)
    } else {
        MseLoss::new().forward(prediction, labels, Reduction::Mean)
    }
}

// ─── Learner Steps ────────────────────────────────────────────────────────────
impl<B: AutodiffBackend> TrainStep<SmilesBatch<B>, RegressionOutput<B>> for MolbertNetwork<B> {
    fn step(&self, batch: SmilesBatch<B>) -> TrainOutput<RegressionOutput<B>> {
        let item = self.forward_step(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<SmilesBatch<B>, RegressionOutput<B>> for MolbertNetwork<B> {
    fn step(&self, batch: SmilesBatch<B>) -> RegressionOutput<B> {
        self.forward_step(batch)
    }
}
