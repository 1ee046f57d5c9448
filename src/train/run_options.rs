use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use crate::train::train_log::TrainLog;

/// Run-time hooks for a `train_loop` call, separate from the hyperparameters.
///
/// # Fields
/// - `progress_tx`: optional channel sender; one `TrainLog` is sent per
///                   completed step.  If the receiver is dropped the loop
///                   stops after that step (clean shutdown).
/// - `stop_flag`  : optional atomic flag; when set to `true` from another
///                   thread the loop stops before the next step.
/// - `export`     : reload the best checkpoint and export it after the loop.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub progress_tx: Option<mpsc::Sender<TrainLog>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
    pub export: bool,
}

impl RunOptions {
    /// No progress channel, no stop flag, no export.
    pub fn new() -> Self {
        RunOptions::default()
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<TrainLog>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }
}
