use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::layers::dense::Dense;
use crate::layers::parameter::Parameter;
use crate::math::tensor::Tensor;
use crate::network::spec::LayerSpec;

/// A stack of dense layers applied row-wise to `[rows, features]` tensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Dense>,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(layer_specs: &[LayerSpec], rng: &mut R) -> Network {
        let layers = layer_specs
            .iter()
            .map(|spec| Dense::new(spec.size, spec.input_size, spec.activation, rng))
            .collect();
        Network { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size).unwrap_or(0)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.size).unwrap_or(0)
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut current = input.clone();
        for layer in &self.layers {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    /// Forward pass that stores activations in each layer for backprop.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward_train(&current)?;
        }
        Ok(current)
    }

    /// Backpropagates `grad_output` through every layer; returns ∂L/∂input.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let mut delta = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta)?;
        }
        Ok(delta)
    }

    pub fn zero_grad(&mut self) {
        for layer in &mut self.layers {
            layer.zero_grad();
        }
    }

    /// Visits every parameter as `{prefix}layers.{i}.weights|biases`.
    pub fn visit_parameters(&mut self, prefix: &str, visitor: &mut dyn FnMut(&str, &mut Parameter)) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            visitor(&format!("{}layers.{}.weights", prefix, i), &mut layer.weights);
            visitor(&format!("{}layers.{}.biases", prefix, i), &mut layer.biases);
        }
    }

    pub fn named_values(&self, prefix: &str) -> Vec<(String, Tensor)> {
        let mut out = Vec::with_capacity(self.layers.len() * 2);
        for (i, layer) in self.layers.iter().enumerate() {
            out.push((format!("{}layers.{}.weights", prefix, i), layer.weights.value.clone()));
            out.push((format!("{}layers.{}.biases", prefix, i), layer.biases.value.clone()));
        }
        out
    }
}
