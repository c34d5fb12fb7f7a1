use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, warn};

use crate::data::loader::BatchLoader;
use crate::error::{Error, Result};
use crate::loss::loss_type::LossType;
use crate::metrics::{class_labels, ConfusionMatrix, MetricResults, TRACKED_METRICS};
use crate::network::predictor::Predictor;
use crate::optim::scheduler::LrScheduler;
use crate::optim::Optimizer;
use crate::train::checkpoint::{BestEntry, BestMetricRegistry, Checkpoint, CHECKPOINT_VERSION};
use crate::train::epoch_stats::{EpochStats, StatsKind};
use crate::train::sink::RunSink;
use crate::train::train_config::TrainConfig;

/// Where the orchestrator is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Training { epoch: usize },
    MidEpochValidating { epoch: usize },
    EndEpochValidating { epoch: usize },
    Checkpointing,
    Terminal,
}

/// What a completed run hands back.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub run_dir: PathBuf,
    /// Every train epoch and validation pass, in the order they ran.
    pub history: Vec<EpochStats>,
    pub best: BTreeMap<String, BestEntry>,
}

impl TrainSummary {
    pub fn validations(&self) -> impl Iterator<Item = &EpochStats> {
        self.history.iter().filter(|s| s.kind == StatsKind::Validation)
    }
}

/// Drives the epoch loop on the calling thread.
///
/// Per train batch: forward, loss, finiteness check, backward, optimizer
/// step, scheduler step, metric update. Validation passes run every
/// `validate_interval` batches (when folds are configured) and after each
/// epoch; each pass may replace the best checkpoint of a tracked metric.
pub struct Trainer {
    model: Box<dyn Predictor>,
    optimizer: Box<dyn Optimizer>,
    scheduler: Option<LrScheduler>,
    criterion: LossType,
    loader_train: BatchLoader,
    loader_val: BatchLoader,
    config: TrainConfig,
    metric_train: ConfusionMatrix,
    metric_val: ConfusionMatrix,
    registry: BestMetricRegistry,
    sinks: Vec<Box<dyn RunSink>>,
    validate_interval: Option<usize>,
    log_every: usize,
    phase: Phase,
    history: Vec<EpochStats>,
}

impl Trainer {
    pub fn new(
        model: Box<dyn Predictor>,
        mut optimizer: Box<dyn Optimizer>,
        scheduler: Option<LrScheduler>,
        loader_train: BatchLoader,
        loader_val: BatchLoader,
        config: TrainConfig,
    ) -> Result<Trainer> {
        config.validate()?;
        if loader_train.is_empty() {
            return Err(Error::Config("training set is empty".to_string()));
        }
        if let Some(s) = &scheduler {
            // Lambda schedules scale the rate before the first step.
            optimizer.set_learning_rate(s.current_lr());
        }

        let run_name = config
            .run_name
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string());
        let run_dir = config.saved_model_directory.join(run_name);
        let validate_interval = config.validate_interval(loader_train.len());

        info!(
            model = %config.model_name,
            criterion = %config.loss_type,
            train_batches = loader_train.len(),
            val_batches = loader_val.len(),
            ?validate_interval,
            run_dir = %run_dir.display(),
            "trainer ready"
        );

        Ok(Trainer {
            model,
            optimizer,
            scheduler,
            criterion: config.loss_type,
            metric_train: ConfusionMatrix::new(config.num_class),
            metric_val: ConfusionMatrix::new(config.num_class),
            registry: BestMetricRegistry::new(run_dir, TRACKED_METRICS),
            sinks: Vec::new(),
            validate_interval,
            log_every: config.log_every(),
            phase: Phase::Idle,
            history: Vec::new(),
            loader_train,
            loader_val,
            config,
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn RunSink>) -> Trainer {
        self.sinks.push(sink);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &BestMetricRegistry {
        &self.registry
    }

    pub fn model(&self) -> &dyn Predictor {
        self.model.as_ref()
    }

    pub fn history(&self) -> &[EpochStats] {
        &self.history
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Runs every epoch, each followed by a full validation pass.
    ///
    /// A non-finite training loss aborts with [`Error::Divergence`]; any
    /// other error from a batch aborts the run as well.
    pub fn start_train(&mut self) -> Result<TrainSummary> {
        for epoch in 1..=self.config.epochs {
            self.train_epoch(epoch)?;
            self.phase = Phase::EndEpochValidating { epoch };
            self.validate(epoch, None)?;
            info!("### {} / {} epoch ended ###", epoch, self.config.epochs);
        }
        self.phase = Phase::Terminal;
        Ok(TrainSummary {
            run_dir: self.registry.dir().to_path_buf(),
            history: self.history.clone(),
            best: self.registry.snapshot(),
        })
    }

    fn train_epoch(&mut self, epoch: usize) -> Result<()> {
        self.phase = Phase::Training { epoch };
        let started = Instant::now();
        let mut batch_losses = Vec::with_capacity(self.loader_train.len());

        for (batch_idx, batch) in self.loader_train.epoch().enumerate() {
            let batch = batch?;

            self.model.zero_grad();
            let output = self.model.forward_train(&batch.inputs)?;
            let (loss, grad) = self.criterion.compute(&output, &batch.targets)?;
            if !loss.is_finite() {
                return Err(Error::Divergence { epoch, batch: batch_idx, loss });
            }
            self.model.backward(&grad)?;
            self.optimizer.step(self.model.as_mut());
            if let Some(scheduler) = self.scheduler.as_mut() {
                let lr = scheduler.step();
                self.optimizer.set_learning_rate(lr);
            }

            batch_losses.push(loss);
            let (ground_truth, predicted) = class_labels(&output, &batch.targets)?;
            self.metric_train.update(&ground_truth, &predicted)?;

            if let Some(interval) = self.validate_interval {
                if batch_idx != 0 && batch_idx % interval == 0 {
                    self.phase = Phase::MidEpochValidating { epoch };
                    self.validate(epoch, Some(batch_idx))?;
                    self.phase = Phase::Training { epoch };
                }
            }

            if batch_idx != 0 && batch_idx % self.log_every == 0 {
                info!(
                    epoch,
                    batch = batch_idx,
                    criterion = %self.criterion,
                    loss = mean(&batch_losses),
                    lr = self.optimizer.learning_rate(),
                    "train running loss"
                );
            }
        }

        let results = self.metric_train.get_results();
        let loss = mean(&batch_losses);
        info!(epoch, criterion = %self.criterion, loss, lr = self.optimizer.learning_rate(), "train epoch done");
        report("Train", epoch, &results);

        let stats = EpochStats {
            epoch,
            total_epochs: self.config.epochs,
            loss,
            learning_rate: self.optimizer.learning_rate(),
            ignored: self.metric_train.ignored(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            ..EpochStats::from_results(StatsKind::Train, results)
        };
        self.emit(stats);
        self.metric_train.reset();
        Ok(())
    }

    /// One full pass over the validation loader without gradient
    /// bookkeeping, followed by the checkpoint decision.
    fn validate(&mut self, epoch: usize, batch: Option<usize>) -> Result<()> {
        let started = Instant::now();
        let mut losses = Vec::with_capacity(self.loader_val.len());

        for item in self.loader_val.epoch() {
            let item = item?;
            let output = self.model.forward(&item.inputs)?;
            let (loss, _) = self.criterion.compute(&output, &item.targets)?;
            losses.push(loss);
            let (ground_truth, predicted) = class_labels(&output, &item.targets)?;
            self.metric_val.update(&ground_truth, &predicted)?;
        }

        let results = self.metric_val.get_results();
        report("Val", epoch, &results);

        let stats = EpochStats {
            epoch,
            total_epochs: self.config.epochs,
            batch,
            loss: mean(&losses),
            learning_rate: self.optimizer.learning_rate(),
            ignored: self.metric_val.ignored(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            ..EpochStats::from_results(StatsKind::Validation, results.clone())
        };
        self.emit(stats);

        let resume = self.phase;
        self.phase = Phase::Checkpointing;
        self.checkpoint(epoch, &results)?;
        self.phase = resume;

        self.metric_val.reset();
        Ok(())
    }

    fn checkpoint(&mut self, epoch: usize, results: &MetricResults) -> Result<()> {
        let mut state = None;
        for &metric in TRACKED_METRICS {
            let Some(value) = results.scalar(metric) else { continue };
            if !self.registry.improves(metric, value) {
                continue;
            }
            let state = state.get_or_insert_with(|| self.model.state_dict()).clone();
            let checkpoint = Checkpoint {
                version: CHECKPOINT_VERSION,
                model_name: self.config.model_name.clone(),
                epoch,
                metric_name: metric.to_string(),
                metric_value: value,
                state,
            };
            self.registry.replace(&checkpoint)?;
        }
        Ok(())
    }

    fn emit(&mut self, stats: EpochStats) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.record(&stats) {
                warn!(error = %e, "run sink failed; continuing");
            }
        }
        self.history.push(stats);
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn report(label: &str, epoch: usize, results: &MetricResults) {
    info!(
        epoch,
        mean_kappa = results.mean_kappa,
        mean_accuracy = results.mean_accuracy,
        "{} metrics",
        label
    );
    for (class, (kappa, accuracy)) in results.class_kappa.iter().zip(&results.class_accuracy).enumerate() {
        info!(class, kappa, accuracy, "{} class score", label);
    }
}
