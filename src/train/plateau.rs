/// What the controller must do after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    /// Accuracy beat the best so far: persist a checkpoint.
    pub improved: bool,
    /// Decay the learning rate and reload the best checkpoint.
    pub plateau: bool,
}

/// Best-accuracy and plateau bookkeeping.
///
/// The counter moves on every step that is not an improvement, evaluated or
/// not, and resets on improvement and on plateau. A plateau fires whenever
/// `counter % patience == patience - 1`.
#[derive(Debug, Clone)]
pub struct PlateauTracker {
    patience: usize,
    best_acc: f64,
    since_best: usize,
}

impl PlateauTracker {
    pub fn new(patience: usize) -> PlateauTracker {
        PlateauTracker {
            patience: patience.max(1),
            best_acc: 0.0,
            since_best: 0,
        }
    }

    pub fn best_acc(&self) -> f64 {
        self.best_acc
    }

    pub fn since_best(&self) -> usize {
        self.since_best
    }

    /// Feeds one step; `test_acc` is `None` on steps without evaluation.
    pub fn observe(&mut self, test_acc: Option<f64>) -> Transition {
        let mut transition = Transition::default();
        match test_acc {
            Some(acc) if acc > self.best_acc => {
                self.best_acc = acc;
                self.since_best = 0;
                transition.improved = true;
            }
            _ => self.since_best += 1,
        }

        if self.since_best % self.patience == self.patience - 1 {
            self.since_best = 0;
            transition.plateau = true;
        }
        transition
    }
}
