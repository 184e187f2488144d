// main.rs
// Description: Command line entry point.
//              - topology: print the component tree and parameter counts of a model.
//              - evaluate: run a model over synthetic epochs with progress meters, then print
//                the confusion matrix, per class report, kappa and optionally save a heatmap.
//              - init-checkpoint: write a freshly initialized model checkpoint.
// History:
// - 2026-10-12: Replace the interactive menu with clap subcommands.
// - 2026-10-17: Add evaluate with meters, report and heatmap.
// - 2026-10-19: Reject configs whose class count differs from the sleep stages.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;

use sleepformer::checkpoint::{load_checkpoint, save_checkpoint};
use sleepformer::data::{SleepStage, SyntheticEpochs};
use sleepformer::math::{argmax_rows, cross_entropy_loss, mean_safe_f64};
use sleepformer::meter::{AverageMeter, ProgressMeter, Summary};
use sleepformer::metrics::{accuracy, ConfusionMatrix};
use sleepformer::plot::{plot_confusion_matrix, HeatmapOptions};
use sleepformer::{build_model, EpochModel, MetricsError, ModelConfig, ModelError, ModelKind};

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

#[derive(Parser, Debug)]
#[command(name = "sleepformer", version, about = "EEG/EMG sleep-stage transformers")]
struct Cli {
    /// trace, debug, info, warn or error
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the component tree and parameter counts.
    Topology {
        #[arg(long, default_value = "tfcm")]
        model: ModelKind,
        /// JSON model configuration; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Evaluate a model on synthetic epochs.
    Evaluate {
        #[arg(long, default_value = "tfcm")]
        model: ModelKind,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Restore model kind, config and parameters from a checkpoint.
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        batches: usize,
        #[arg(long, default_value_t = 16)]
        batch_size: usize,
        #[arg(long, default_value_t = 128.0)]
        sample_rate: f32,
        #[arg(long, default_value_t = 0.1)]
        noise: f32,
        #[arg(long, default_value_t = 7)]
        data_seed: u64,
        #[arg(long, default_value_t = 1)]
        print_freq: usize,
        /// Save the confusion matrix heatmap to this PNG.
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Write a freshly initialized checkpoint.
    InitCheckpoint {
        #[arg(long, default_value = "tfcm")]
        model: ModelKind,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
}

struct EvalArgs {
    i_batches: usize,
    i_batch_size: usize,
    d_sample_rate: f32,
    d_noise: f32,
    u_data_seed: u64,
    i_print_freq: usize,
    opt_plot: Option<PathBuf>,
}

fn load_config(opt_path: Option<&PathBuf>) -> Result<ModelConfig, ModelError> {
    match opt_path {
        Some(p) => ModelConfig::from_json_file(p),
        None => {
            let cfg = ModelConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

fn print_topology(model: &dyn EpochModel, cfg: &ModelConfig) {
    println!();
    for s_line in model.topology_lines() {
        println!("{}", s_line);
    }
    println!("d_model: {}", cfg.d_model);
    println!("n_heads: {}", cfg.n_heads);
    println!("seq_len: {}", cfg.seq_len);
    println!("patch_len: {}", cfg.patch_len);
    println!("e_layers: {}", cfg.e_layers);
    println!("ca_layers: {}", cfg.ca_layers);
}

// Synthetic labels are always Wake, SWS or REM.
fn check_stage_classes(cfg: &ModelConfig) -> Result<(), ModelError> {
    let i_stages = SleepStage::ALL.len();
    if cfg.c_out != i_stages {
        return Err(ModelError::InvalidConfig(format!(
            "evaluate_requires_c_out_{}: got {}",
            i_stages, cfg.c_out
        )));
    }
    Ok(())
}

fn run_evaluate(model: &mut dyn EpochModel, cfg: &ModelConfig, args: &EvalArgs) -> Result<(), CliError> {
    check_stage_classes(cfg)?;
    model.set_training(false);
    let mut synth = SyntheticEpochs::new(cfg.seq_len, args.d_sample_rate, args.d_noise, args.u_data_seed)?;

    let mut progress = ProgressMeter::new(
        args.i_batches,
        vec![
            AverageMeter::new("Loss", ":.4f", Summary::Average)?,
            AverageMeter::new("Acc@1", ":6.2f", Summary::Average)?,
        ],
        "Test: ",
    );
    let mut cm = ConfusionMatrix::new(cfg.c_out)?;
    let mut v_label_batches: Vec<Vec<usize>> = Vec::with_capacity(args.i_batches);
    let mut v_pred_batches: Vec<Vec<usize>> = Vec::with_capacity(args.i_batches);
    let mut v_batch_kappa: Vec<f64> = Vec::with_capacity(args.i_batches);

    for i_batch in 0..args.i_batches {
        let (a_x, v_labels) = synth.next_batch(args.i_batch_size);
        let out = model.forward(&a_x, &v_labels)?;

        let d_loss = cross_entropy_loss(&out.a_logits, &v_labels) as f64;
        let v_preds = argmax_rows(&out.a_logits);
        let d_acc = 100.0 * accuracy(&[v_labels.clone()], &[v_preds.clone()])?;

        let mut batch_cm = ConfusionMatrix::new(cfg.c_out)?;
        batch_cm.add_batch(&v_preds, &v_labels)?;
        v_batch_kappa.push(batch_cm.kappa());
        cm.add_batch(&v_preds, &v_labels)?;

        if let Some(m) = progress.meter_mut("Loss") {
            m.update(d_loss, v_labels.len());
        }
        if let Some(m) = progress.meter_mut("Acc@1") {
            m.update(d_acc, v_labels.len());
        }
        if args.i_print_freq > 0 && i_batch % args.i_print_freq == 0 {
            progress.display(i_batch);
        }

        v_label_batches.push(v_labels);
        v_pred_batches.push(v_preds);
    }

    for m in progress.meters_mut() {
        m.all_reduce();
    }
    progress.display_summary();

    let v_names = SleepStage::names();
    println!();
    println!("=== Confusion Matrix ===");
    for s_line in cm.to_ascii_lines(&v_names) {
        println!("{}", s_line);
    }
    println!();
    println!("=== Classification Report ===");
    for s_line in cm.report().to_ascii_lines(&v_names) {
        println!("{}", s_line);
    }
    println!();
    println!("samples: {}", cm.total());
    println!("correct: {}", cm.correct());
    println!("misclassified: {}", cm.misclassified());
    println!("accuracy: {:.6}", accuracy(&v_label_batches, &v_pred_batches)?);
    println!("kappa: {:.6}", cm.kappa());
    println!("kappa_batch_mean: {:.6}", mean_safe_f64(&v_batch_kappa));

    if let Some(p_plot) = &args.opt_plot {
        let opts = HeatmapOptions {
            v_target_names: v_names.iter().map(|s| s.to_string()).collect(),
            p_output: p_plot.clone(),
            ..HeatmapOptions::default()
        };
        let p_saved = plot_confusion_matrix(&cm, &opts)?;
        println!("heatmap: {}", p_saved.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Topology { model, config } => {
            let cfg = load_config(config.as_ref())?;
            let m = build_model(model, &cfg)?;
            print_topology(m.as_ref(), &cfg);
        }
        Command::Evaluate {
            model,
            config,
            checkpoint,
            batches,
            batch_size,
            sample_rate,
            noise,
            data_seed,
            print_freq,
            plot,
        } => {
            let args = EvalArgs {
                i_batches: batches,
                i_batch_size: batch_size,
                d_sample_rate: sample_rate,
                d_noise: noise,
                u_data_seed: data_seed,
                i_print_freq: print_freq,
                opt_plot: plot,
            };
            let (cfg, mut m) = match checkpoint {
                Some(p_ckpt) => {
                    let (cp, m) = load_checkpoint(&p_ckpt)?;
                    (cp.config, m)
                }
                None => {
                    let cfg = load_config(config.as_ref())?;
                    let m = build_model(model, &cfg)?;
                    (cfg, m)
                }
            };
            tracing::info!(model = m.model_type(), parameters = m.parameters(), "evaluating");
            run_evaluate(m.as_mut(), &cfg, &args)?;
        }
        Command::InitCheckpoint { model, config, output } => {
            let cfg = load_config(config.as_ref())?;
            let m = build_model(model, &cfg)?;
            save_checkpoint(&output, model, &cfg, m.as_ref())?;
            println!("Saved checkpoint: {}", output.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
