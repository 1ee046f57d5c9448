pub mod evaluate;
pub mod export;
pub mod hp_config;
pub mod loop_fn;
pub mod model;
pub mod plateau;
pub mod run_options;
pub mod sweep;
pub mod train_log;

pub use evaluate::{evaluate, Evaluation, EVAL_CHUNK};
pub use export::{export_best, ExportArtifact, ExportPaths, Exporter, GraphExporter};
pub use hp_config::HPConfig;
pub use loop_fn::{train_loop, EVAL_INTERVAL};
pub use model::{train_model, TrainOutcome};
pub use plateau::{PlateauTracker, Transition};
pub use run_options::RunOptions;
pub use sweep::{run_sweep, save_results, SweepGrid, SweepResult};
pub use train_log::TrainLog;
