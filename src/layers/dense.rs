use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::parameter::Parameter;
use crate::math::tensor::Tensor;

/// Fully connected layer over `[rows, input_size]` batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub size: usize,
    pub input_size: usize,
    pub weights: Parameter,
    pub biases: Parameter,
    pub activator: ActivationFunction,
    #[serde(skip)]
    inputs: Option<Tensor>,
    // pre-activation values (z = xW + b) needed for the derivative
    #[serde(skip)]
    pre_activations: Option<Tensor>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        let weights = if activation.prefers_he_init() {
            Tensor::he(input_size, size, rng)
        } else {
            Tensor::xavier(input_size, size, rng)
        };
        Dense {
            size,
            input_size,
            weights: Parameter::new(weights),
            biases: Parameter::new(Tensor::zeros(&[1, size])),
            activator: activation,
            inputs: None,
            pre_activations: None,
        }
    }

    fn affine(&self, input: &Tensor) -> Result<Tensor> {
        let (_, cols) = input.dims2()?;
        if cols != self.input_size {
            return Err(Error::Shape(format!(
                "dense layer expects {} input features, got {}",
                self.input_size, cols
            )));
        }
        let mut z = input.matmul(&self.weights.value)?;
        z.add_row(&self.biases.value)?;
        Ok(z)
    }

    /// Inference pass; leaves the backprop cache untouched.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let z = self.affine(input)?;
        Ok(self.activator.apply(&z))
    }

    /// Training pass; caches the input and pre-activations for `backward`.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let z = self.affine(input)?;
        let a = self.activator.apply(&z);
        self.inputs = Some(input.clone());
        self.pre_activations = Some(z);
        Ok(a)
    }

    /// Accumulates parameter gradients and returns ∂L/∂input.
    ///
    /// `grad_output` is ∂L/∂a for this layer (error in activation space).
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let (inputs, z) = match (self.inputs.take(), self.pre_activations.take()) {
            (Some(inputs), Some(z)) => (inputs, z),
            _ => return Err(Error::Shape("backward called before forward_train".into())),
        };
        if grad_output.shape() != z.shape() {
            return Err(Error::Shape(format!(
                "gradient {:?} does not match layer output {:?}",
                grad_output.shape(),
                z.shape()
            )));
        }

        // δ = error ⊙ σ'(z)
        let mut delta = grad_output.clone();
        if self.activator != ActivationFunction::Identity {
            for (d, &zv) in delta.data_mut().iter_mut().zip(z.data()) {
                *d *= self.activator.derivative(zv);
            }
        }

        let w_grad = inputs.transpose()?.matmul(&delta)?;
        let b_grad = delta.sum_rows()?;
        if self.weights.grad.shape() != w_grad.shape() {
            self.weights.zero_grad();
            self.biases.zero_grad();
        }
        self.weights.grad += &w_grad;
        self.biases.grad += &b_grad;

        delta.matmul(&self.weights.value.transpose()?)
    }

    pub fn zero_grad(&mut self) {
        self.weights.zero_grad();
        self.biases.zero_grad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn weight_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = Dense::new(2, 3, ActivationFunction::Tanh, &mut rng);
        let input = Tensor::from_vec(&[2, 3], vec![0.5, -0.2, 0.1, 0.3, 0.8, -0.7]).unwrap();

        // L = sum(outputs), so dL/da = 1 everywhere.
        let out = layer.forward_train(&input).unwrap();
        let ones = Tensor::filled(out.shape(), 1.0);
        layer.backward(&ones).unwrap();
        let analytic = layer.weights.grad.data()[1];

        let h = 1e-3;
        let mut plus = layer.clone();
        plus.weights.value.data_mut()[1] += h;
        let mut minus = layer.clone();
        minus.weights.value.data_mut()[1] -= h;
        let lp: f32 = plus.forward(&input).unwrap().data().iter().sum();
        let lm: f32 = minus.forward(&input).unwrap().data().iter().sum();
        let numeric = (lp - lm) / (2.0 * h);
        assert!((numeric - analytic).abs() < 1e-2, "{} vs {}", numeric, analytic);
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = Dense::new(2, 3, ActivationFunction::ReLU, &mut rng);
        assert!(layer.forward(&Tensor::zeros(&[1, 4])).is_err());
    }
}
