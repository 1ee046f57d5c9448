use std::sync::atomic::Ordering;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::augment::{geometric_transform, normalize};
use crate::checkpoint::{CheckpointInfo, CheckpointStore};
use crate::data::Dataset;
use crate::error::{Result, TrainError};
use crate::loss::CrossEntropyLoss;
use crate::math::Tensor;
use crate::network::Classifier;
use crate::optim::Optimizer;
use crate::train::evaluate::evaluate;
use crate::train::hp_config::HPConfig;
use crate::train::plateau::PlateauTracker;
use crate::train::run_options::RunOptions;
use crate::train::train_log::TrainLog;

/// Steps with `step % EVAL_INTERVAL == EVAL_INTERVAL - 1` run a test-set evaluation.
pub const EVAL_INTERVAL: usize = 10;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `model` for `cfg.total_steps(dataset.train_len())` steps and returns
/// one `TrainLog` per completed step.
///
/// # Arguments
/// - `model`     : trained in place; holds the last step's parameters on return
/// - `optimizer` : its learning rate is reset to `cfg.lr` before the first step
/// - `dataset`   : train split is sampled with replacement, test split is evaluated
/// - `store`     : receives a snapshot on every improvement under `model_name`
/// - `model_name`: checkpoint key; any snapshot left by an earlier run is removed
/// - `cfg`       : hyperparameters, validated before anything else happens
/// - `options`   : optional progress channel and stop flag
///
/// # Plateau handling
/// When the plateau counter fires, the learning rate is multiplied by
/// `cfg.lr_decay` and the best checkpoint is loaded back into the model.
/// Optimizer moments are kept. A plateau before the first improvement is
/// fatal: the run ends with `CheckpointNotFound`.
///
/// # Early termination
/// The loop stops early, returning the logs so far, if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `options.stop_flag` is set to `true`.
///
/// # Errors
/// A non-finite training loss, gradient or test loss aborts with
/// `NumericInstability` before the optimizer applies the update.
pub fn train_loop<M: Classifier + ?Sized>(
    model: &mut M,
    optimizer: &mut dyn Optimizer,
    dataset: &Dataset,
    store: &CheckpointStore,
    model_name: &str,
    cfg: &HPConfig,
    options: &RunOptions,
) -> Result<Vec<TrainLog>> {
    cfg.validate()?;

    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let total_steps = cfg.total_steps(dataset.train_len());
    let ranges = cfg.augment_ranges();
    let (height, width) = dataset.image_dims();

    if store.remove(model_name)? {
        debug!(model = model_name, "removed stale checkpoint");
    }
    optimizer.set_learning_rate(cfg.lr);
    model.set_training(true);
    model.zero_grad();

    let mut tracker = PlateauTracker::new(cfg.patience);
    let mut logs = Vec::with_capacity(total_steps);
    let start = Instant::now();

    info!(
        model = model_name,
        steps = total_steps,
        batch_size = cfg.batch_size,
        lr = cfg.lr,
        optimizer = optimizer.name(),
        "training started"
    );

    for step in 0..total_steps {
        if let Some(ref flag) = options.stop_flag {
            if flag.load(Ordering::Relaxed) {
                warn!(step, "stop requested, ending run early");
                break;
            }
        }

        // ── One optimisation step ─────────────────────────────────────────
        let indices: Vec<usize> = (0..cfg.batch_size)
            .map(|_| rng.gen_range(0..dataset.train_len()))
            .collect();
        let (images, labels) = dataset.train_batch(&indices)?;
        let transforms = ranges.sample(cfg.batch_size, height, width, &mut rng);
        let inputs = normalize(&geometric_transform(&images, &transforms, cfg.sampling)?);

        let train_loss = train_step(model, optimizer, &inputs, &labels, step)?;

        // ── Periodic evaluation ───────────────────────────────────────────
        let (test_loss, test_acc) = if step % EVAL_INTERVAL == EVAL_INTERVAL - 1 {
            let eval = evaluate(model, &dataset.test_images, &dataset.test_labels)?;
            if !eval.loss.is_finite() {
                return Err(TrainError::NumericInstability {
                    step,
                    what: "test loss".to_string(),
                    value: eval.loss,
                });
            }
            info!(step, test_loss = eval.loss, test_acc = eval.accuracy, "evaluated");
            (Some(eval.loss), Some(eval.accuracy))
        } else {
            (None, None)
        };

        // ── Best tracking and plateau recovery ────────────────────────────
        let transition = tracker.observe(test_acc);
        if transition.improved {
            let info_meta = CheckpointInfo {
                step,
                test_acc: tracker.best_acc(),
            };
            store.save_annotated(model_name, &model.state_dict(), info_meta)?;
            info!(step, best_acc = tracker.best_acc(), "new best, checkpoint saved");
        }
        if transition.plateau {
            if !store.exists(model_name) {
                return Err(TrainError::CheckpointNotFound {
                    model: model_name.to_string(),
                });
            }
            let lr = optimizer.learning_rate() * cfg.lr_decay;
            optimizer.set_learning_rate(lr);
            model.load_state_dict(&store.load(model_name)?)?;
            info!(step, lr, "plateau, learning rate decayed and best checkpoint restored");
        }

        // ── Emit progress ─────────────────────────────────────────────────
        let log = TrainLog {
            step,
            train_loss,
            test_loss,
            test_acc,
            best_acc: tracker.best_acc(),
            lr: optimizer.learning_rate(),
            time: start.elapsed().as_secs_f64(),
            batch_size: cfg.batch_size,
            width: cfg.width,
            depth: cfg.depth,
            opt_name: optimizer.name().to_string(),
        };
        debug!(step, train_loss, lr = log.lr, best_acc = log.best_acc, "step");
        logs.push(log.clone());

        if let Some(ref tx) = options.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(log).is_err() {
                warn!(step, "progress receiver dropped, ending run early");
                break;
            }
        }
    }

    info!(
        model = model_name,
        steps = logs.len(),
        best_acc = tracker.best_acc(),
        elapsed = start.elapsed().as_secs_f64(),
        "training finished"
    );
    Ok(logs)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Forward, loss, backward, update, clear. Returns the batch loss.
///
/// Loss and gradients are checked before the update so a non-finite value
/// never reaches the parameters.
fn train_step<M: Classifier + ?Sized>(
    model: &mut M,
    optimizer: &mut dyn Optimizer,
    inputs: &Tensor,
    labels: &[u8],
    step: usize,
) -> Result<f64> {
    let logits = model.forward(inputs)?;
    let (loss, grad) = CrossEntropyLoss::loss_and_grad(&logits, labels)?;
    if !loss.is_finite() {
        return Err(TrainError::NumericInstability {
            step,
            what: "train loss".to_string(),
            value: loss,
        });
    }
    model.backward(&grad)?;

    for (name, param) in model.named_parameters() {
        if let Some(bad) = param.grad.first_non_finite() {
            return Err(TrainError::NumericInstability {
                step,
                what: format!("gradient of {}", name),
                value: bad as f64,
            });
        }
    }

    let mut params = model.parameters_mut();
    optimizer.step(&mut params);
    optimizer.zero_grad(&mut params);
    Ok(loss)
}
