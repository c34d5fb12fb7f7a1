use std::collections::HashMap;

use crate::math::tensor::Tensor;
use crate::network::predictor::Predictor;
use crate::optim::Optimizer;

/// Adam with decoupled weight decay.
///
/// Moment buffers are keyed by parameter name, so the optimizer follows the
/// predictor across `load_state_dict` calls.
pub struct AdamW {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    step_count: i32,
    moments: HashMap<String, (Tensor, Tensor)>,
}

impl AdamW {
    pub fn new(learning_rate: f64) -> AdamW {
        AdamW {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
            step_count: 0,
            moments: HashMap::new(),
        }
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, model: &mut dyn Predictor) {
        self.step_count += 1;
        let lr = self.learning_rate as f32;
        let (b1, b2) = (self.beta1 as f32, self.beta2 as f32);
        let eps = self.eps as f32;
        let decay = 1.0 - lr * self.weight_decay as f32;
        let bias1 = 1.0 - b1.powi(self.step_count);
        let bias2 = 1.0 - b2.powi(self.step_count);
        let moments = &mut self.moments;

        model.visit_parameters(&mut |name, param| {
            let (m, v) = moments
                .entry(name.to_string())
                .or_insert_with(|| (Tensor::zeros(param.value.shape()), Tensor::zeros(param.value.shape())));
            let values = param.value.data_mut();
            let grads = param.grad.data();
            for i in 0..values.len().min(grads.len()) {
                let g = grads[i];
                let mi = b1 * m.data()[i] + (1.0 - b1) * g;
                let vi = b2 * v.data()[i] + (1.0 - b2) * g * g;
                m.data_mut()[i] = mi;
                v.data_mut()[i] = vi;
                let m_hat = mi / bias1;
                let v_hat = vi / bias2;
                values[i] = values[i] * decay - lr * m_hat / (v_hat.sqrt() + eps);
            }
        });
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
