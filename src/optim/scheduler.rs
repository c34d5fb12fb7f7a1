use std::f64::consts::PI;

use serde::{Serialize, Deserialize};

use crate::registry::name_registry;

/// Learning-rate schedules, selected by the `scheduler` config name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SchedulerKind {
    WarmupCosine,
    CosineAnnealing,
    Constant,
    WarmupConstant,
}

name_registry!(SchedulerKind, "scheduler", {
    "WarmupCosine" => WarmupCosine,
    "CosineAnnealingLR" => CosineAnnealing,
    "ConstantLRSchedule" => Constant,
    "WarmupConstantSchedule" => WarmupConstant,
});

/// A multiplicative schedule over the base learning rate, stepped once per
/// training batch.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    kind: SchedulerKind,
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    cycles: f64,
    t_max: usize,
    eta_min: f64,
    step: usize,
}

impl LrScheduler {
    /// Builds the schedule for a run with `train_batches` batches per epoch.
    ///
    /// Steps per epoch is `train_batches / batch_size`, floored at 1.
    /// Warmup-cosine warms up for one such "epoch" and decays over
    /// `train_batches` steps with 10 cycles; warmup-constant warms up for 100.
    pub fn new(kind: SchedulerKind, base_lr: f64, train_batches: usize, batch_size: usize) -> LrScheduler {
        let steps_per_epoch = (train_batches / batch_size.max(1)).max(1);
        let warmup_steps = match kind {
            SchedulerKind::WarmupCosine => steps_per_epoch,
            SchedulerKind::WarmupConstant => steps_per_epoch * 100,
            _ => 0,
        };
        LrScheduler {
            kind,
            base_lr,
            warmup_steps,
            total_steps: train_batches.max(1),
            cycles: 10.0,
            t_max: 100,
            eta_min: 0.0,
            step: 0,
        }
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    /// Learning rate for the current step count.
    pub fn current_lr(&self) -> f64 {
        let step = self.step as f64;
        match self.kind {
            SchedulerKind::Constant => self.base_lr,
            SchedulerKind::WarmupConstant => self.base_lr * self.warmup_factor().unwrap_or(1.0),
            SchedulerKind::WarmupCosine => {
                if let Some(factor) = self.warmup_factor() {
                    return self.base_lr * factor;
                }
                let progress = (step - self.warmup_steps as f64)
                    / (self.total_steps.saturating_sub(self.warmup_steps).max(1)) as f64;
                let factor = 0.5 * (1.0 + (PI * self.cycles * 2.0 * progress).cos());
                self.base_lr * factor.max(0.0)
            }
            SchedulerKind::CosineAnnealing => {
                let phase = PI * step / self.t_max as f64;
                self.eta_min + (self.base_lr - self.eta_min) * (1.0 + phase.cos()) / 2.0
            }
        }
    }

    fn warmup_factor(&self) -> Option<f64> {
        if self.step < self.warmup_steps {
            Some(self.step as f64 / self.warmup_steps.max(1) as f64)
        } else {
            None
        }
    }

    /// Advances one step and returns the new learning rate.
    pub fn step(&mut self) -> f64 {
        self.step += 1;
        self.current_lr()
    }
}
