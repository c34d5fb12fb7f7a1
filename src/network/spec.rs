use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;

/// Describes one layer in a network specification.
///
/// Fields:
/// - `size`      : number of neurons in this layer
/// - `input_size`: number of features feeding into this layer
/// - `activation`: activation applied after the affine transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub input_size: usize,
    pub activation: ActivationFunction,
}

/// Builds a chain of layer specs: `input -> hidden... -> output`, with
/// `hidden_activation` on every hidden layer and `output_activation` last.
pub fn chain(
    input_size: usize,
    hidden: &[usize],
    output_size: usize,
    hidden_activation: ActivationFunction,
    output_activation: ActivationFunction,
) -> Vec<LayerSpec> {
    let mut specs = Vec::with_capacity(hidden.len() + 1);
    let mut fan_in = input_size;
    for &size in hidden {
        specs.push(LayerSpec { size, input_size: fan_in, activation: hidden_activation });
        fan_in = size;
    }
    specs.push(LayerSpec { size: output_size, input_size: fan_in, activation: output_activation });
    specs
}
