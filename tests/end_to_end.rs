mod common;

use common::quadrant_dataset;
use ferrite_digits::network::{LayerSpec, NetworkSpec};
use ferrite_digits::train::{evaluate, save_results};
use ferrite_digits::{
    run_sweep, train_model, ActivationFunction, Architecture, CheckpointStore, Classifier,
    GraphExporter, HPConfig, Network, OptimizerKind, RunOptions, StateDict, SweepGrid,
    SweepResult, TrainLog,
};
use rand::{rngs::StdRng, SeedableRng};

fn small_mlp_config() -> HPConfig {
    HPConfig {
        batch_size: 32,
        lr: 1e-2,
        optimizer: OptimizerKind::Adam,
        width: 16,
        depth: 1,
        activation: ActivationFunction::ReLU,
        epochs: 5,
        patience: 1000,
        angle: 0.0,
        scale: 0.0,
        shift: 0.0,
        seed: Some(42),
        ..HPConfig::default()
    }
}

#[test]
fn mlp_learns_and_checkpoint_matches_best_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let dataset = quadrant_dataset(128, 40);
    let cfg = small_mlp_config();

    let outcome = train_model(
        Architecture::Mlp,
        None,
        &cfg,
        &dataset,
        &store,
        &GraphExporter,
        &RunOptions::new(),
    )
    .unwrap();

    assert_eq!(outcome.model_name, "mnist_mlp");
    assert_eq!(outcome.logs.len(), 20);
    assert!(outcome.logs.windows(2).all(|w| w[0].best_acc <= w[1].best_acc));
    assert!(outcome.best_acc() > 25.0, "best accuracy {}", outcome.best_acc());

    // Reload the snapshot into a fresh network and evaluate it again.
    let mut rng = StdRng::seed_from_u64(0);
    let mut fresh = Network::mlp(16, 1, ActivationFunction::ReLU, &mut rng);
    fresh.load_state_dict(&store.load("mnist_mlp").unwrap()).unwrap();
    let eval = evaluate(&mut fresh, &dataset.test_images, &dataset.test_labels).unwrap();
    assert_eq!(eval.accuracy, outcome.best_acc());
}

#[test]
fn seeded_runs_are_reproducible() {
    let dataset = quadrant_dataset(64, 8);
    let cfg = HPConfig {
        epochs: 2,
        angle: 15.0,
        scale: 0.1,
        shift: 0.1,
        ..small_mlp_config()
    };
    let losses = |root: &std::path::Path| -> Vec<f64> {
        let store = CheckpointStore::new(root);
        train_model(
            Architecture::Mlp,
            None,
            &cfg,
            &dataset,
            &store,
            &GraphExporter,
            &RunOptions::new(),
        )
        .unwrap()
        .logs
        .iter()
        .map(|l| l.train_loss)
        .collect()
    };
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    assert_eq!(losses(a.path()), losses(b.path()));
}

#[test]
fn convnet_trains_and_exports_graph() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let dataset = quadrant_dataset(40, 8);
    let cfg = HPConfig {
        batch_size: 4,
        epochs: 1,
        sampling: ferrite_digits::SamplingMode::Bilinear,
        angle: 10.0,
        ..small_mlp_config()
    };

    let outcome = train_model(
        Architecture::Conv,
        None,
        &cfg,
        &dataset,
        &store,
        &GraphExporter,
        &RunOptions::new().with_export(true),
    );

    // A single evaluation at 0% leaves nothing to export.
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(ferrite_digits::TrainError::CheckpointNotFound { .. }) => return,
        Err(other) => panic!("unexpected error {:?}", other),
    };
    assert_eq!(outcome.logs.len(), 10);

    let paths = outcome.export.expect("export requested");
    let spec = NetworkSpec::load_json(&paths.program).unwrap();
    assert_eq!(spec.name, "mnist_convnet");
    assert_eq!(spec.input_shape, vec![1, 28, 28]);
    assert!(spec.layers.contains(&LayerSpec::Dropout { p: 0.5 }));
    assert_eq!(spec.metadata.as_ref().and_then(|m| m.step), Some(9));

    let params = StateDict::from_safetensors(&std::fs::read(&paths.params).unwrap()).unwrap();
    for name in spec.tensor_names() {
        assert!(params.get(name).is_some(), "missing {}", name);
    }
    assert_eq!(params.get("layers.8.weight").unwrap().shape(), &[10, 1600]);
    assert_eq!(
        StateDict::read_metadata(&std::fs::read(&paths.params).unwrap()).unwrap()["target"],
        "graph"
    );
}

#[test]
fn sweep_ranks_runs_by_best_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let dataset = quadrant_dataset(64, 16);
    let base = HPConfig { epochs: 5, ..small_mlp_config() };
    let grid = SweepGrid {
        lr: vec![1e-2, 1e-4],
        optimizer: vec![OptimizerKind::Adam, OptimizerKind::Sgd],
        ..SweepGrid::default()
    };

    let results = run_sweep(Architecture::Mlp, &base, &grid, &dataset, &store, &RunOptions::new())
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.windows(2).all(|w| w[0].best_acc >= w[1].best_acc));
    assert!(results.iter().all(|r| r.steps == 10));
    for r in &results {
        assert_eq!(r.logs.len(), r.steps);
        assert!(r.logs.iter().enumerate().all(|(i, log)| log.step == i));
        assert_eq!(r.logs.last().unwrap().best_acc, r.best_acc);
    }
    let mut runs: Vec<usize> = results.iter().map(|r| r.run).collect();
    runs.sort();
    assert_eq!(runs, vec![0, 1, 2, 3]);

    let summary = dir.path().join("sweep_results.json");
    let log_paths = save_results(&results, &summary).unwrap();
    assert_eq!(log_paths.len(), 4);
    let first = std::fs::read_to_string(&log_paths[0]).unwrap();
    let lines: Vec<TrainLog> = first.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines, results[0].logs);
    assert!(log_paths[0].ends_with(format!("run-{}.jsonl", results[0].run)));

    let reread: Vec<SweepResult> =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(reread.len(), 4);
    assert!(reread.iter().all(|r| r.logs.is_empty()));
}
