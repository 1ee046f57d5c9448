pub mod activation;
pub mod augment;
pub mod checkpoint;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod math;
pub mod network;
pub mod optim;
pub mod train;

// Convenience re-exports
pub use activation::ActivationFunction;
pub use augment::{geometric_transform, normalize, AffineBatch, AugmentRanges, SamplingMode};
pub use checkpoint::{CheckpointInfo, CheckpointStore, StateDict};
pub use data::Dataset;
pub use error::{Result, TrainError};
pub use math::Tensor;
pub use network::{Architecture, Classifier, Network};
pub use optim::{Adam, Optimizer, OptimizerKind, Sgd};
pub use train::{
    export_best, run_sweep, train_loop, train_model, Exporter, GraphExporter, HPConfig,
    RunOptions, SweepGrid, SweepResult, TrainLog, TrainOutcome,
};
