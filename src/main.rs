use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ferrite_digits::activation::ActivationFunction;
use ferrite_digits::augment::SamplingMode;
use ferrite_digits::optim::OptimizerKind;
use ferrite_digits::train::save_results;
use ferrite_digits::{
    run_sweep, train_model, Architecture, CheckpointStore, Dataset, GraphExporter, HPConfig,
    RunOptions, SweepGrid, TrainLog,
};

/// Train digit classifiers with on-the-fly augmentation.
#[derive(Parser, Debug)]
#[command(name = "ferrite-digits", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train one model and optionally export it
    Train {
        #[command(flatten)]
        common: CommonArgs,

        /// Write one JSON line per step to this file
        #[arg(long, value_name = "PATH")]
        log: Option<PathBuf>,

        /// Export the best checkpoint as a JSON layer graph after training
        #[arg(long)]
        export: bool,
    },
    /// Train one model per grid point and rank them by best accuracy
    Sweep {
        #[command(flatten)]
        common: CommonArgs,

        /// JSON grid, e.g. {"lr": [1e-2, 1e-3], "optimizer": ["Adam", "SGD"]}
        #[arg(long, value_name = "PATH")]
        grid: PathBuf,

        /// Where to write the ranked results
        #[arg(long, value_name = "PATH", default_value = "sweep_results.json")]
        results: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory holding the four MNIST IDX files
    #[arg(long, value_name = "DIR")]
    data: PathBuf,

    /// Model architecture
    #[arg(long, env = "TYPE", default_value = "mlp")]
    arch: Architecture,

    /// Root directory for checkpoints and exports
    #[arg(long, value_name = "DIR", default_value = "models")]
    out: PathBuf,

    /// Hyperparameter JSON file; flags below override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    lr: Option<f64>,
    #[arg(long)]
    optimizer: Option<OptimizerKind>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    depth: Option<usize>,
    #[arg(long)]
    activation: Option<ActivationFunction>,
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    lr_decay: Option<f64>,
    #[arg(long)]
    patience: Option<usize>,
    #[arg(long)]
    angle: Option<f32>,
    #[arg(long)]
    scale: Option<f32>,
    #[arg(long)]
    shift: Option<f32>,
    #[arg(long)]
    sampling: Option<SamplingMode>,
    #[arg(long)]
    seed: Option<u64>,
}

impl CommonArgs {
    fn hp_config(&self) -> Result<HPConfig> {
        let mut cfg = match &self.config {
            Some(path) => HPConfig::load_json(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => HPConfig::default(),
        };
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.lr {
            cfg.lr = v;
        }
        if let Some(v) = self.optimizer {
            cfg.optimizer = v;
        }
        if let Some(v) = self.width {
            cfg.width = v;
        }
        if let Some(v) = self.depth {
            cfg.depth = v;
        }
        if let Some(v) = self.activation {
            cfg.activation = v;
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.lr_decay {
            cfg.lr_decay = v;
        }
        if let Some(v) = self.patience {
            cfg.patience = v;
        }
        if let Some(v) = self.angle {
            cfg.angle = v;
        }
        if let Some(v) = self.scale {
            cfg.scale = v;
        }
        if let Some(v) = self.shift {
            cfg.shift = v;
        }
        if let Some(v) = self.sampling {
            cfg.sampling = v;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Train { common, log, export } => train(&common, log.as_deref(), export),
        Command::Sweep { common, grid, results } => sweep(&common, &grid, &results),
    }
}

fn train(common: &CommonArgs, log_path: Option<&Path>, export: bool) -> Result<()> {
    let cfg = common.hp_config()?;
    let dataset = Dataset::load_idx_dir(&common.data)
        .with_context(|| format!("loading dataset from {}", common.data.display()))?;
    let store = CheckpointStore::new(&common.out);
    let mut options = RunOptions::new().with_export(export);

    // Step logs are written as JSON lines from a separate thread while training runs.
    let writer = match log_path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let (tx, rx) = mpsc::channel::<TrainLog>();
            options = options.with_progress(tx);
            Some(thread::spawn(move || -> std::io::Result<()> {
                let mut out = BufWriter::new(file);
                for log in rx {
                    serde_json::to_writer(&mut out, &log)?;
                    out.write_all(b"\n")?;
                }
                out.flush()
            }))
        }
        None => None,
    };

    let outcome = train_model(common.arch, None, &cfg, &dataset, &store, &GraphExporter, &options);
    // Dropping the sender ends the writer loop.
    drop(options);
    if let Some(handle) = writer {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("log writer thread panicked"))?
            .context("writing step log")?;
    }
    let outcome = outcome.context("training failed")?;

    info!(
        model = %outcome.model_name,
        steps = outcome.logs.len(),
        best_acc = outcome.best_acc(),
        "done"
    );
    if let Some(paths) = &outcome.export {
        println!("exported {} and {}", paths.program.display(), paths.params.display());
    }
    println!("best test accuracy: {:.2}%", outcome.best_acc());
    Ok(())
}

fn sweep(common: &CommonArgs, grid_path: &Path, results_path: &Path) -> Result<()> {
    let base = common.hp_config()?;
    let grid = SweepGrid::load_json(grid_path)
        .with_context(|| format!("reading grid {}", grid_path.display()))?;
    let dataset = Dataset::load_idx_dir(&common.data)
        .with_context(|| format!("loading dataset from {}", common.data.display()))?;
    let store = CheckpointStore::new(&common.out);

    let results = run_sweep(common.arch, &base, &grid, &dataset, &store, &RunOptions::new())?;
    let log_paths = save_results(&results, results_path)?;

    for r in &results {
        println!(
            "run {:>3}  best {:6.2}%  lr {:.1e}  bs {:>4}  depth {}  width {:>4}  {} / {}",
            r.run,
            r.best_acc,
            r.config.lr,
            r.config.batch_size,
            r.config.depth,
            r.config.width,
            r.config.optimizer,
            r.config.activation,
        );
    }
    println!(
        "results written to {} ({} step logs alongside)",
        results_path.display(),
        log_paths.len()
    );
    Ok(())
}
