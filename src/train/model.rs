use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::data::Dataset;
use crate::error::Result;
use crate::network::{Architecture, Network};
use crate::train::export::{export_best, ExportPaths, Exporter};
use crate::train::hp_config::HPConfig;
use crate::train::loop_fn::train_loop;
use crate::train::run_options::RunOptions;
use crate::train::train_log::TrainLog;

/// Everything a finished `train_model` call produced.
#[derive(Debug)]
pub struct TrainOutcome {
    pub model_name: String,
    pub logs: Vec<TrainLog>,
    /// The trained network; holds the best checkpoint if it was exported.
    pub network: Network,
    pub export: Option<ExportPaths>,
}

impl TrainOutcome {
    pub fn best_acc(&self) -> f64 {
        self.logs.last().map_or(0.0, |l| l.best_acc)
    }

    pub fn final_lr(&self) -> Option<f64> {
        self.logs.last().map(|l| l.lr)
    }
}

/// Builds the network for `architecture`, trains it and, when
/// `options.export` is set, exports the best checkpoint with `exporter`.
///
/// Checkpoints land under `store` as `architecture.model_name()` unless
/// `name` overrides it.
pub fn train_model(
    architecture: Architecture,
    name: Option<&str>,
    cfg: &HPConfig,
    dataset: &Dataset,
    store: &CheckpointStore,
    exporter: &dyn Exporter,
    options: &RunOptions,
) -> Result<TrainOutcome> {
    cfg.validate()?;
    let model_name = name.unwrap_or(architecture.model_name()).to_string();

    // Parameter init draws from its own stream so a seeded run is
    // reproducible independent of the loop's sampling.
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };
    let mut network =
        Network::for_architecture(architecture, cfg.width, cfg.depth, cfg.activation, &mut rng);
    let mut optimizer = cfg.optimizer.build(cfg.lr);
    info!(
        model = %model_name,
        architecture = %architecture,
        parameters = network.parameter_count(),
        "network built"
    );

    let logs = train_loop(
        &mut network,
        optimizer.as_mut(),
        dataset,
        store,
        &model_name,
        cfg,
        options,
    )?;

    let export = if options.export {
        Some(export_best(&mut network, store, &model_name, exporter, &mut rng)?)
    } else {
        None
    };

    Ok(TrainOutcome {
        model_name,
        logs,
        network,
        export,
    })
}
