// ============================================================
// Layer 2 — FinetuneSmilesApp
// ============================================================
// Fine-tunes a (possibly pretrained) SMILES encoder on one
// property and evaluates it on the test split.
//
//   finetune:
//     Step 1: Build the fine-tuning model and network
//     Step 2: Load pretrained weights   (--pretrained-model-path)
//     Step 3: Freeze encoder layers     (--freeze-level)
//     Step 4: Save tokenizer.json
//     Step 5: Fit                       (MolbertApp::run)
//     Step 6: Reload the checkpoint with the lowest validation loss
//     Step 7: Test epoch → checkpoint/metrics.json
//
//   test:
//     Step 1: Rebuild the network from hparams.json
//     Step 2: Strictly load the checkpoint
//     Step 3: Test epoch → metrics.json next to the checkpoint
//
// Reference: Rust Book §10 (Traits)

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::Path;

use crate::application::app::{FinishedRun, MolbertApp, RunConfig};
use crate::data::featurizer::SmilesFeaturizer;
use crate::infra::{
    checkpoint::{checkpoint_file, load_model_weights, load_network},
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    base::MolbertModel,
    finetune::{FinetuneHparams, FinetuneSmilesModel},
    model::MolbertNetwork,
    tester::{test_dataloader, TestEpoch, TestEpochSummary},
};

pub struct FinetuneSmilesApp;

impl MolbertApp for FinetuneSmilesApp {
    type Hparams = FinetuneHparams;
    type Model   = FinetuneSmilesModel;

    fn get_model<B: AutodiffBackend>(
        &self,
        args:   &RunConfig<FinetuneHparams>,
        device: &B::Device,
    ) -> Result<(FinetuneSmilesModel, MolbertNetwork<B>)> {
        let hparams = &args.model;
        let model   = FinetuneSmilesModel::new(hparams.clone());
        let mut network = model.build_network::<B>(device)?;

        if let Some(path) = &hparams.pretrained_model_path {
            network = load_model_weights(network, path, device)?;
        }

        if hparams.freeze_level != 0 {
            tracing::info!("Freezing encoder with level {}", hparams.freeze_level);
        }
        network = network.freeze(hparams.freeze_level);

        let featurizer = SmilesFeaturizer::bert_smiles_index_featurizer(hparams.max_seq_length)?;
        TokenizerStore::new(args.trainer.root()).save(featurizer.tokenizer())?;

        Ok((model, network))
    }
}

impl FinetuneSmilesApp {
    /// Fit, then evaluate the best validation checkpoint on the test split.
    pub fn finetune<B: AutodiffBackend>(
        &self,
        args:    &RunConfig<FinetuneHparams>,
        devices: Vec<B::Device>,
    ) -> Result<TestEpochSummary> {
        let device = devices.first().cloned().context("No training device selected")?;
        let FinishedRun { model, trained, tracker } = self.run::<B>(args, devices)?;

        let network = trained.network.valid();
        let best    = checkpoint_file(args.trainer.root(), trained.best_epoch);
        let network = if best.exists() {
            tracing::info!("Testing the checkpoint of epoch {}", trained.best_epoch);
            load_network(network, &best, &device)?
        } else {
            tracing::warn!("No checkpoint at '{}'; testing the final weights", best.display());
            network
        };

        let summary = self.test::<B::InnerBackend>(
            &model,
            &network,
            &trained.checkpoint_dir,
            args.trainer.seed,
            device,
        )?;

        if let Some(tracker) = &tracker {
            tracker.log("test", trained.best_epoch, "test_loss", summary.test_loss)?;
            tracker.log_report("test", trained.best_epoch, &summary.metrics)?;
        }
        Ok(summary)
    }

    /// Evaluate a saved checkpoint with the hyper-parameters of its run.
    pub fn evaluate_checkpoint<B: Backend>(
        &self,
        args:       &RunConfig<FinetuneHparams>,
        checkpoint: &Path,
        device:     B::Device,
    ) -> Result<TestEpochSummary> {
        let model   = FinetuneSmilesModel::new(args.model.clone());
        let network = model.build_network::<B>(&device)?;
        let network = load_network(network, checkpoint, &device)?;

        let dir = checkpoint.parent().unwrap_or_else(|| Path::new("."));
        self.test(&model, &network, dir, args.trainer.seed, device)
    }

    fn test<B: Backend>(
        &self,
        model:          &FinetuneSmilesModel,
        network:        &MolbertNetwork<B>,
        checkpoint_dir: &Path,
        seed:           u64,
        device:         B::Device,
    ) -> Result<TestEpochSummary> {
        let splits = model.load_datasets(seed)?;
        let loader = test_dataloader::<B>(splits.test, device);
        TestEpoch::new(network, model, checkpoint_dir).run(loader)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::record::CompactRecorder;
    use std::io::Write;

    use crate::application::app::tests::settings;
    use crate::domain::task::Mode;
    use crate::infra::report::read_metrics;
    use crate::ml::finetune::tests::hparams;

    type TestBackend  = NdArray<f32>;
    type TestAutodiff = Autodiff<TestBackend>;

    fn run_config(dir: &Path, mode: Mode, output_size: usize) -> RunConfig<FinetuneHparams> {
        let csv = |name: &str| {
            let path = dir.join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "SMILES,y\nCCO,1\nCCN,0\nc1ccccc1,1\nCCCl,0").unwrap();
            path
        };
        let mut model = hparams(mode, output_size);
        model.train_file = csv("train.csv");
        model.valid_file = csv("valid.csv");
        model.test_file  = csv("test.csv");
        RunConfig { trainer: settings(dir), model }
    }

    #[test]
    fn test_get_model_applies_freeze_level_and_saves_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = run_config(dir.path(), Mode::Classification, 2);
        args.model.freeze_level = -1;

        let (_, network) = FinetuneSmilesApp
            .get_model::<TestAutodiff>(&args, &Default::default())
            .unwrap();

        assert!(!network.encoder.token_embedding.weight.val().is_require_grad());
        assert!(network.heads[0].classifier.weight.val().is_require_grad());
        assert!(dir.path().join("tokenizer.json").exists());
    }

    #[test]
    fn test_get_model_loads_pretrained_encoder() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let args   = run_config(dir.path(), Mode::Regression, 1);

        let donor = FinetuneSmilesModel::new(args.model.clone())
            .build_network::<TestBackend>(&device)
            .unwrap();
        let expected = donor.encoder.token_embedding.weight.val().into_data().to_vec::<f32>().unwrap();
        donor.save_file(dir.path().join("pretrained"), &CompactRecorder::new()).unwrap();

        let mut args = args;
        args.model.pretrained_model_path = Some(dir.path().join("pretrained.mpk"));
        let (_, network) = FinetuneSmilesApp.get_model::<TestAutodiff>(&args, &device).unwrap();

        let loaded = network.encoder.token_embedding.weight.val().into_data().to_vec::<f32>().unwrap();
        assert!(loaded.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-2));
    }

    #[test]
    fn test_evaluate_checkpoint_writes_metrics_next_to_it() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let args   = run_config(dir.path(), Mode::Classification, 2);

        let ckpt_dir = dir.path().join("checkpoint");
        std::fs::create_dir_all(&ckpt_dir).unwrap();
        FinetuneSmilesModel::new(args.model.clone())
            .build_network::<TestBackend>(&device)
            .unwrap()
            .save_file(ckpt_dir.join("model-1"), &CompactRecorder::new())
            .unwrap();

        let summary = FinetuneSmilesApp
            .evaluate_checkpoint::<TestBackend>(&args, &ckpt_dir.join("model-1.mpk"), device)
            .unwrap();

        let written = read_metrics(&ckpt_dir.join("metrics.json")).unwrap();
        assert_eq!(written, summary.metrics);
        assert!(summary.test_loss.is_finite());
    }

    #[test]
    fn test_fast_dev_run_writes_run_artifacts() {
        let dir  = tempfile::tempdir().unwrap();
        let mut args = run_config(dir.path(), Mode::Classification, 2);
        args.trainer.fast_dev_run     = true;
        args.trainer.track_experiment = true;

        let summary = FinetuneSmilesApp
            .finetune::<TestAutodiff>(&args, vec![Default::default()])
            .unwrap();

        let root = dir.path();
        assert!(root.join("hparams.json").exists());
        assert!(root.join("tokenizer.json").exists());
        assert!(root.join("checkpoint").join("model-1.mpk").exists());
        assert_eq!(summary.report_path, root.join("checkpoint").join("metrics.json"));
        assert!(summary.report_path.exists());
        assert!(summary.test_loss.is_finite());
        assert_eq!(std::fs::read_dir(root.join("experiments")).unwrap().count(), 1);
    }

    #[test]
    fn test_run_fits_one_epoch_and_picks_it_as_best() {
        let dir  = tempfile::tempdir().unwrap();
        let args = run_config(dir.path(), Mode::Regression, 1);

        let finished = FinetuneSmilesApp
            .run::<TestAutodiff>(&args, vec![Default::default()])
            .unwrap();

        assert_eq!(finished.trained.last_epoch, 1);
        assert_eq!(finished.trained.best_epoch, 1);
        assert!(finished.tracker.is_none());
        assert!(checkpoint_file(dir.path(), 1).exists());
    }

    #[test]
    fn test_resume_from_missing_epoch_fails() {
        let dir  = tempfile::tempdir().unwrap();
        let mut args = run_config(dir.path(), Mode::Classification, 2);
        args.trainer.max_epochs             = 6;
        args.trainer.resume_from_checkpoint = Some(5);

        let result = FinetuneSmilesApp.run::<TestAutodiff>(&args, vec![Default::default()]);

        assert!(result.is_err());
        assert!(!checkpoint_file(dir.path(), 6).exists());
    }
}
