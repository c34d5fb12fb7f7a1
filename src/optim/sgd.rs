use crate::network::predictor::Predictor;
use crate::optim::Optimizer;

pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    /// Applies one SGD update to every parameter from its accumulated gradient.
    fn step(&mut self, model: &mut dyn Predictor) {
        let lr = self.learning_rate as f32;
        model.visit_parameters(&mut |_, param| {
            for (w, &g) in param.value.data_mut().iter_mut().zip(param.grad.data()) {
                *w -= lr * g;
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
