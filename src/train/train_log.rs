use serde::{Deserialize, Serialize};

/// One record per training step, emitted by `train_loop`.
///
/// Evaluation fields are only set on evaluation steps. `batch_size`, `width`,
/// `depth` and `opt_name` repeat the run's hyperparameters so a log file can
/// be grouped without the config that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainLog {
    /// 0-based step index.
    pub step: usize,
    pub train_loss: f64,
    pub test_loss: Option<f64>,
    /// Test accuracy in percent.
    pub test_acc: Option<f64>,
    /// Best test accuracy seen so far in this run, in percent.
    pub best_acc: f64,
    /// Learning rate after this step's plateau handling.
    pub lr: f64,
    /// Seconds since the run started.
    pub time: f64,
    pub batch_size: usize,
    pub width: usize,
    pub depth: usize,
    pub opt_name: String,
}

impl TrainLog {
    pub fn is_eval(&self) -> bool {
        self.test_acc.is_some()
    }
}
