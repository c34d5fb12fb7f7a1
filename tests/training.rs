mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::mpsc;

use common::{loader, Scripted};
use ferrite_train::data::Mode;
use ferrite_train::network::CheckpointFormat;
use ferrite_train::train::{ChannelSink, Phase, StatsKind, TrainConfig, Trainer};
use ferrite_train::{Error, LossType, ModelKind, OptimizerKind, Predictor, RunConfig, SchedulerKind};

fn config(root: &Path, epochs: usize, loss: LossType) -> TrainConfig {
    let mut cfg = TrainConfig::new("Scripted", epochs, 1, 2, loss);
    cfg.saved_model_directory = root.to_path_buf();
    cfg.run_name = Some("run".to_string());
    cfg
}

fn checkpoints_for(dir: &Path, metric: &str) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(metric) && name.ends_with(".json"))
        .collect()
}

#[test]
fn folds_trigger_mid_epoch_validation_on_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), 1, LossType::CrossEntropy);
    cfg.train_fold = Some(4);
    let mut trainer = Trainer::new(
        Box::new(Scripted::new()),
        OptimizerKind::Sgd.build(0.1),
        None,
        loader(8, 1, Mode::Train),
        loader(4, 4, Mode::Validation),
        cfg,
    )
    .unwrap();

    let summary = trainer.start_train().unwrap();
    let triggers: Vec<Option<usize>> = summary.validations().map(|s| s.batch).collect();
    assert_eq!(triggers, vec![Some(2), Some(4), Some(6), None]);
    assert_eq!(trainer.phase(), Phase::Terminal);
}

#[test]
fn non_finite_loss_stops_the_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Scripted::new();
    model.nan_on_train_call = Some(3);
    let train_calls = model.train_calls.clone();
    let eval_calls = model.eval_calls.clone();
    let mut trainer = Trainer::new(
        Box::new(model),
        OptimizerKind::AdamW.build(1e-3),
        None,
        loader(8, 1, Mode::Train),
        loader(4, 4, Mode::Validation),
        config(dir.path(), 2, LossType::Mse),
    )
    .unwrap();

    let err = trainer.start_train().unwrap_err();
    match err {
        Error::Divergence { epoch, batch, loss } => {
            assert_eq!((epoch, batch), (1, 3));
            assert!(!loss.is_finite());
        }
        other => panic!("expected divergence, got {other}"),
    }
    assert_eq!(train_calls.load(Ordering::SeqCst), 4);
    assert_eq!(eval_calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("run").exists());
}

#[test]
fn improving_metric_keeps_exactly_one_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Scripted::new();
    model.perfect_from = 1;
    let (tx, rx) = mpsc::channel();
    let mut trainer = Trainer::new(
        Box::new(model),
        OptimizerKind::Sgd.build(0.1),
        None,
        loader(4, 2, Mode::Train),
        loader(4, 4, Mode::Validation),
        config(dir.path(), 2, LossType::CrossEntropy),
    )
    .unwrap()
    .with_sink(Box::new(ChannelSink::new(tx)));

    let summary = trainer.start_train().unwrap();
    let run_dir = dir.path().join("run");
    assert_eq!(summary.run_dir, run_dir);

    // Pass one predicts class 0 only (mean accuracy 0.5), pass two is exact.
    let accuracy_files = checkpoints_for(&run_dir, "mean_accuracy");
    assert_eq!(accuracy_files, vec!["Scripted_Epoch_2_mean_accuracy_1.json".to_string()]);
    let best = &summary.best["mean_accuracy"];
    assert_eq!(best.value, 1.0);
    assert_eq!(best.path.as_deref(), Some(run_dir.join(&accuracy_files[0]).as_path()));
    assert_eq!(checkpoints_for(&run_dir, "mean_kappa").len(), 1);

    let streamed: Vec<StatsKind> = rx.try_iter().map(|s| s.kind).collect();
    assert_eq!(
        streamed,
        vec![StatsKind::Train, StatsKind::Validation, StatsKind::Train, StatsKind::Validation]
    );
}

#[test]
fn scheduler_sets_the_rate_before_the_first_step() {
    let dir = tempfile::tempdir().unwrap();
    let train = loader(8, 1, Mode::Train);
    let scheduler = ferrite_train::optim::LrScheduler::new(SchedulerKind::WarmupCosine, 0.1, train.len(), 1);
    let trainer = Trainer::new(
        Box::new(Scripted::new()),
        OptimizerKind::AdamW.build(0.1),
        Some(scheduler),
        train,
        loader(2, 2, Mode::Validation),
        config(dir.path(), 1, LossType::CrossEntropy),
    )
    .unwrap();
    assert_eq!(trainer.learning_rate(), 0.0);
    assert_eq!(trainer.phase(), Phase::Idle);
}

#[test]
fn run_config_trains_end_to_end_and_checkpoints_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (x, y) = common::write_paired_fixture(&dir.path().join("train"), 6);
    let (vx, vy) = common::write_paired_fixture(&dir.path().join("val"), 2);
    let log = dir.path().join("run.jsonl");
    let cfg = RunConfig {
        model_name: ModelKind::PixelMlp,
        criterion: LossType::CrossEntropy,
        scheduler: Some(SchedulerKind::WarmupCosine),
        epochs: 2,
        batch_size: 2,
        worker: 2,
        hidden: vec![8],
        seed: 3,
        train_fold: Some(2),
        saved_model_directory: dir.path().join("runs"),
        log_jsonl: Some(log.clone()),
        train_x_path: Some(x),
        train_y_path: Some(y),
        val_x_path: Some(vx),
        val_y_path: Some(vy),
        augment: ferrite_train::AugmentConfig { hflip: true, jitter: true, ..Default::default() },
        ..RunConfig::default()
    };

    let mut trainer = cfg.build_trainer().unwrap();
    let summary = trainer.start_train().unwrap();
    // 3 train batches, fold 2: interval 1, so passes after batches 1 and 2
    // plus the end-of-epoch pass.
    assert_eq!(summary.validations().count(), 6);
    assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), summary.history.len());

    for (metric, best) in &summary.best {
        assert!(checkpoints_for(&summary.run_dir, metric).len() <= 1);
        if let Some(path) = &best.path {
            assert_eq!(CheckpointFormat::detect(path), CheckpointFormat::Native);
            let mut fresh = cfg.build_model().unwrap();
            fresh.load_pretrained(path).unwrap();
            assert_eq!(fresh.state_dict().len(), trainer.model().state_dict().len());
        }
    }
}
