// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `finetune` — fine-tunes on train/valid CSVs, then tests
//   2. `test`     — evaluates a saved checkpoint
//
// The backend is picked here from --accelerator and --precision:
//
//   wgpu + 32 → Autodiff<Wgpu<f32>>
//   wgpu + 16 → Autodiff<Wgpu<f16>>
//   cpu  + 32 → Autodiff<NdArray<f32>>
//   cpu  + 16 → rejected
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::{bail, Result};
use burn::backend::{
    ndarray::NdArrayDevice,
    wgpu::WgpuDevice,
    Autodiff, NdArray, Wgpu,
};
use burn::tensor::f16;
use clap::Parser;
use commands::{Commands, FinetuneCommand, TestArgs};

use crate::application::{
    app::{Accelerator, Precision, RunConfig},
    finetune_app::FinetuneSmilesApp,
};
use crate::infra::checkpoint::load_hparams;
use crate::ml::{finetune::FinetuneHparams, tester::TestEpochSummary};

type WgpuFull = Autodiff<Wgpu<f32, i32>>;
type WgpuHalf = Autodiff<Wgpu<f16, i32>>;
type CpuFull  = Autodiff<NdArray<f32>>;

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "molbert-finetune",
    version = "0.1.0",
    about = "Fine-tune a SMILES BERT encoder for molecular property prediction."
)]
pub struct Cli {
    /// The subcommand to run (finetune or test)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Finetune(args) => run_finetune(args),
            Commands::Test(args)     => run_test(args),
        }
    }
}

/// Handles the `finetune` subcommand.
fn run_finetune(command: FinetuneCommand) -> Result<()> {
    let args: RunConfig<FinetuneHparams> = command.into();
    let t = &args.trainer;

    tracing::info!(
        "Fine-tuning on '{}' ({} mode)",
        args.model.train_file.display(),
        args.model.mode
    );

    let summary = match (t.accelerator, t.precision) {
        (Accelerator::Wgpu, Precision::Full) => {
            FinetuneSmilesApp.finetune::<WgpuFull>(&args, wgpu_devices(t.gpus))?
        }
        (Accelerator::Wgpu, Precision::Half) => {
            FinetuneSmilesApp.finetune::<WgpuHalf>(&args, wgpu_devices(t.gpus))?
        }
        (Accelerator::Cpu, Precision::Full) => {
            FinetuneSmilesApp.finetune::<CpuFull>(&args, cpu_devices(t.gpus))?
        }
        (Accelerator::Cpu, Precision::Half) => bail!("16-bit precision needs --accelerator wgpu"),
    };

    print_summary(&summary);
    Ok(())
}

/// Handles the `test` subcommand.
fn run_test(command: TestArgs) -> Result<()> {
    let hparams_path = command.hparams_path();
    tracing::info!("Loading run arguments from '{}'", hparams_path.display());
    let args = command.apply(load_hparams(&hparams_path)?);
    let t = &args.trainer;

    let app        = FinetuneSmilesApp;
    let checkpoint = &command.checkpoint;

    let summary = match (t.accelerator, t.precision) {
        (Accelerator::Wgpu, Precision::Full) => {
            app.evaluate_checkpoint::<Wgpu<f32, i32>>(&args, checkpoint, first_wgpu(t.gpus))?
        }
        (Accelerator::Wgpu, Precision::Half) => {
            app.evaluate_checkpoint::<Wgpu<f16, i32>>(&args, checkpoint, first_wgpu(t.gpus))?
        }
        (Accelerator::Cpu, Precision::Full) => {
            app.evaluate_checkpoint::<NdArray<f32>>(&args, checkpoint, NdArrayDevice::Cpu)?
        }
        (Accelerator::Cpu, Precision::Half) => bail!("16-bit precision needs --accelerator wgpu"),
    };

    print_summary(&summary);
    Ok(())
}

/// `gpus = 0` keeps the default adapter; `n` selects the first n discrete GPUs.
fn wgpu_devices(gpus: usize) -> Vec<WgpuDevice> {
    if gpus == 0 {
        vec![WgpuDevice::default()]
    } else {
        (0..gpus).map(WgpuDevice::DiscreteGpu).collect()
    }
}

fn cpu_devices(gpus: usize) -> Vec<NdArrayDevice> {
    if gpus > 0 {
        tracing::warn!("--gpus {} ignored with --accelerator cpu", gpus);
    }
    vec![NdArrayDevice::Cpu]
}

fn first_wgpu(gpus: usize) -> WgpuDevice {
    wgpu_devices(gpus).into_iter().next().unwrap_or_default()
}

fn print_summary(summary: &TestEpochSummary) {
    println!("\nTest loss: {:.6}", summary.test_loss);
    for (name, value) in summary.metrics.iter() {
        println!("  {:<18} {:.6}", name, value);
    }
    println!("Metrics written to {}", summary.report_path.display());
}
