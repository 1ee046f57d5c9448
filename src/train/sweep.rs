use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activation::ActivationFunction;
use crate::checkpoint::CheckpointStore;
use crate::data::Dataset;
use crate::error::{Result, TrainError};
use crate::network::Architecture;
use crate::optim::OptimizerKind;
use crate::train::export::GraphExporter;
use crate::train::hp_config::HPConfig;
use crate::train::model::train_model;
use crate::train::run_options::RunOptions;
use crate::train::train_log::TrainLog;

/// Values to try per hyperparameter. An empty list keeps the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepGrid {
    pub lr: Vec<f64>,
    pub batch_size: Vec<usize>,
    pub depth: Vec<usize>,
    pub width: Vec<usize>,
    pub optimizer: Vec<OptimizerKind>,
    pub activation: Vec<ActivationFunction>,
}

impl SweepGrid {
    /// Cartesian product of every listed value applied over `base`.
    pub fn expand(&self, base: &HPConfig) -> Vec<HPConfig> {
        let mut configs = vec![base.clone()];
        configs = product(configs, &self.lr, |c, v| c.lr = *v);
        configs = product(configs, &self.batch_size, |c, v| c.batch_size = *v);
        configs = product(configs, &self.depth, |c, v| c.depth = *v);
        configs = product(configs, &self.width, |c, v| c.width = *v);
        configs = product(configs, &self.optimizer, |c, v| c.optimizer = *v);
        configs = product(configs, &self.activation, |c, v| c.activation = *v);
        configs
    }

    pub fn load_json(path: &Path) -> Result<SweepGrid> {
        let file = File::open(path).map_err(|e| TrainError::io(path, e))?;
        Ok(serde_json::from_reader(file)?)
    }
}

fn product<T>(
    configs: Vec<HPConfig>,
    values: &[T],
    apply: impl Fn(&mut HPConfig, &T),
) -> Vec<HPConfig> {
    if values.is_empty() {
        return configs;
    }
    let mut out = Vec::with_capacity(configs.len() * values.len());
    for config in &configs {
        for value in values {
            let mut c = config.clone();
            apply(&mut c, value);
            out.push(c);
        }
    }
    out
}

/// Summary of one sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub run: usize,
    pub config: HPConfig,
    pub best_acc: f64,
    pub final_lr: f64,
    pub steps: usize,
    /// Every step of the run. Written separately by `save_results`.
    #[serde(skip)]
    pub logs: Vec<TrainLog>,
}

/// Trains one model per grid point, one after another, and returns the
/// results sorted by best accuracy, highest first.
///
/// Every run reuses the architecture's model name, so each starts from an
/// empty checkpoint slot. Nothing is exported.
pub fn run_sweep(
    architecture: Architecture,
    base: &HPConfig,
    grid: &SweepGrid,
    dataset: &Dataset,
    store: &CheckpointStore,
    options: &RunOptions,
) -> Result<Vec<SweepResult>> {
    let configs = grid.expand(base);
    for cfg in &configs {
        cfg.validate()?;
    }
    info!(runs = configs.len(), architecture = %architecture, "sweep started");

    let run_options = options.clone().with_export(false);
    let mut results = Vec::with_capacity(configs.len());
    for (run, cfg) in configs.into_iter().enumerate() {
        info!(
            run,
            lr = cfg.lr,
            batch_size = cfg.batch_size,
            depth = cfg.depth,
            width = cfg.width,
            optimizer = %cfg.optimizer,
            activation = %cfg.activation,
            "sweep run"
        );
        let outcome = train_model(
            architecture,
            None,
            &cfg,
            dataset,
            store,
            &GraphExporter,
            &run_options,
        )?;
        results.push(SweepResult {
            run,
            best_acc: outcome.best_acc(),
            final_lr: outcome.final_lr().unwrap_or(cfg.lr),
            steps: outcome.logs.len(),
            logs: outcome.logs,
            config: cfg,
        });
    }

    results.sort_by(|a, b| b.best_acc.total_cmp(&a.best_acc));
    Ok(results)
}

/// Writes the ranked summaries to `path` and each run's step log as JSON
/// lines to `run-<n>.jsonl` in the same directory.
///
/// Returns the step log paths in `results` order.
pub fn save_results(results: &[SweepResult], path: &Path) -> Result<Vec<PathBuf>> {
    let file = File::create(path).map_err(|e| TrainError::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), results)?;

    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut log_paths = Vec::with_capacity(results.len());
    for result in results {
        let log_path = dir.join(format!("run-{}.jsonl", result.run));
        write_step_log(&result.logs, &log_path)?;
        log_paths.push(log_path);
    }
    Ok(log_paths)
}

fn write_step_log(logs: &[TrainLog], path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| TrainError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for log in logs {
        serde_json::to_writer(&mut out, log)?;
        out.write_all(b"\n").map_err(|e| TrainError::io(path, e))?;
    }
    out.flush().map_err(|e| TrainError::io(path, e))
}
