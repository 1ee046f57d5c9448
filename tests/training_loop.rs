mod common;

use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use common::{blank_dataset, ScriptedClassifier};
use ferrite_digits::checkpoint::CheckpointInfo;
use ferrite_digits::{
    train_loop, Classifier, CheckpointStore, HPConfig, OptimizerKind, RunOptions,
    StateDict, Tensor, TrainError, TrainLog,
};

const MODEL: &str = "scripted";

fn config(patience: usize, epochs: usize) -> HPConfig {
    HPConfig {
        batch_size: 64,
        lr: 1e-3,
        optimizer: OptimizerKind::Adam,
        epochs,
        lr_decay: 0.5,
        patience,
        angle: 0.0,
        scale: 0.0,
        shift: 0.0,
        seed: Some(1),
        ..HPConfig::default()
    }
}

fn run(
    model: &mut ScriptedClassifier,
    store: &CheckpointStore,
    cfg: &HPConfig,
    options: &RunOptions,
) -> Result<Vec<TrainLog>, TrainError> {
    let mut optimizer = cfg.optimizer.build(cfg.lr);
    train_loop(model, optimizer.as_mut(), &blank_dataset(100), store, MODEL, cfg, options)
}

fn lr_change_steps(logs: &[TrainLog], initial: f64) -> Vec<usize> {
    let mut prev = initial;
    let mut steps = Vec::new();
    for log in logs {
        assert!(log.lr <= prev, "lr increased at step {}", log.step);
        if log.lr != prev {
            steps.push(log.step);
        }
        prev = log.lr;
    }
    steps
}

#[test]
fn plateau_decays_lr_and_keeps_first_best() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let cfg = config(15, 10);
    let mut model = ScriptedClassifier::new(vec![50.0, 40.0, 40.0, 40.0]);

    let logs = run(&mut model, &store, &cfg, &RunOptions::new()).unwrap();

    assert_eq!(logs.len(), 40);
    assert_eq!(lr_change_steps(&logs, cfg.lr), vec![23, 37]);
    assert_eq!(logs[22].lr, 1e-3);
    assert_eq!(logs[23].lr, 5e-4);
    assert_eq!(logs[39].lr, 2.5e-4);

    let eval_steps: Vec<usize> = logs.iter().filter(|l| l.is_eval()).map(|l| l.step).collect();
    assert_eq!(eval_steps, vec![9, 19, 29, 39]);
    assert!(logs.iter().all(|l| l.best_acc == if l.step < 9 { 0.0 } else { 50.0 }));

    // The only improvement was the first evaluation; the snapshot never moved.
    assert_eq!(
        store.info(MODEL).unwrap(),
        Some(CheckpointInfo { step: 9, test_acc: 50.0 })
    );
    let saved = store.load(MODEL).unwrap();
    assert_eq!(saved.get("tag").unwrap().data(), &[1.0]);
}

#[test]
fn plateau_before_any_checkpoint_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let (tx, rx) = mpsc::channel();
    let options = RunOptions::new().with_progress(tx);
    let mut model = ScriptedClassifier::new(vec![]);

    let err = run(&mut model, &store, &config(2, 10), &options).unwrap_err();

    assert!(matches!(err, TrainError::CheckpointNotFound { ref model } if model == MODEL));
    assert_eq!(rx.try_iter().count(), 0);
}

#[test]
fn checkpoint_tracks_highest_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let cfg = config(1000, 13);
    let mut model = ScriptedClassifier::new(vec![10.0, 30.0, 20.0, 50.0, 40.0]);

    let logs = run(&mut model, &store, &cfg, &RunOptions::new()).unwrap();

    assert_eq!(logs.len(), 52);
    let mut running_best = 0.0f64;
    for log in &logs {
        if let Some(acc) = log.test_acc {
            running_best = running_best.max(acc);
        }
        assert_eq!(log.best_acc, running_best, "step {}", log.step);
    }
    assert!(lr_change_steps(&logs, cfg.lr).is_empty());

    assert_eq!(
        store.info(MODEL).unwrap(),
        Some(CheckpointInfo { step: 39, test_acc: 50.0 })
    );
    // Evaluation 3 (tag 4) produced the 50% snapshot.
    let mut restored = ScriptedClassifier::new(vec![]);
    restored.load_state_dict(&store.load(MODEL).unwrap()).unwrap();
    assert_eq!(restored.tag(), 4.0);
}

#[test]
fn plateau_reload_restores_best_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    // Improvement at step 9, decay at step 23; evaluation at step 19 bumped the
    // live tag to 2, the reload puts it back to 1.
    let mut model = ScriptedClassifier::new(vec![50.0, 40.0]);
    let (tx, rx) = mpsc::channel();
    let options = RunOptions::new().with_progress(tx);

    let cfg = HPConfig { epochs: 6, ..config(15, 6) };
    let logs = run(&mut model, &store, &cfg, &options).unwrap();

    assert_eq!(logs.len(), 24);
    assert_eq!(lr_change_steps(&logs, cfg.lr), vec![23]);
    assert_eq!(model.tag(), 1.0);
    assert_eq!(rx.try_iter().count(), 24);
}

#[test]
fn non_finite_train_loss_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let (tx, rx) = mpsc::channel();
    let mut model = ScriptedClassifier::new(vec![]);
    model.nan_loss_at = Some(3);

    let err = run(&mut model, &store, &config(50, 10), &RunOptions::new().with_progress(tx))
        .unwrap_err();

    match err {
        TrainError::NumericInstability { step, what, value } => {
            assert_eq!(step, 3);
            assert_eq!(what, "train loss");
            assert!(value.is_nan());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(rx.try_iter().count(), 3);
}

#[test]
fn non_finite_gradient_aborts_before_update() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let mut model = ScriptedClassifier::new(vec![]);
    model.nan_grad_at = Some(5);

    let err = run(&mut model, &store, &config(50, 10), &RunOptions::new()).unwrap_err();

    assert!(matches!(
        err,
        TrainError::NumericInstability { step: 5, ref what, .. } if what == "gradient of w"
    ));
    assert_eq!(model.w(), 0.5);
}

#[test]
fn stop_flag_ends_run_before_next_step() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let flag = Arc::new(AtomicBool::new(true));
    let mut model = ScriptedClassifier::new(vec![]);

    let logs = run(&mut model, &store, &config(50, 10), &RunOptions::new().with_stop_flag(flag))
        .unwrap();

    assert!(logs.is_empty());
    assert_eq!(model.train_steps, 0);
}

#[test]
fn dropped_receiver_ends_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let (tx, rx) = mpsc::channel();
    drop(rx);
    let mut model = ScriptedClassifier::new(vec![]);

    let logs = run(&mut model, &store, &config(50, 10), &RunOptions::new().with_progress(tx))
        .unwrap();

    assert_eq!(logs.len(), 1);
}

#[test]
fn invalid_config_fails_before_any_step() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let mut model = ScriptedClassifier::new(vec![]);
    let cfg = HPConfig { batch_size: 0, ..config(50, 10) };

    let err = run(&mut model, &store, &cfg, &RunOptions::new()).unwrap_err();

    assert!(matches!(err, TrainError::Config(_)));
    assert_eq!(model.train_steps, 0);
}

#[test]
fn stale_checkpoint_from_earlier_run_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let mut stale = StateDict::new();
    stale.insert("tag", Tensor::full(&[1], 99.0));
    stale.insert("w", Tensor::zeros(&[1]));
    store.save(MODEL, &stale).unwrap();

    // Nothing ever improves on 0%, so no new snapshot is written.
    let mut model = ScriptedClassifier::new(vec![0.0; 4]);
    run(&mut model, &store, &config(1000, 10), &RunOptions::new()).unwrap();

    assert!(!store.exists(MODEL));
}

#[test]
fn learning_rate_is_reset_to_config() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let cfg = config(1000, 1);
    let mut optimizer = OptimizerKind::Sgd.build(0.5);
    let mut model = ScriptedClassifier::new(vec![]);

    let logs = train_loop(
        &mut model,
        optimizer.as_mut(),
        &blank_dataset(10),
        &store,
        MODEL,
        &cfg,
        &RunOptions::new(),
    )
    .unwrap();

    assert_eq!(optimizer.learning_rate(), 1e-3);
    assert!(logs.iter().all(|l| l.opt_name == "SGD" && l.batch_size == 64));
}
