use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::layers::parameter::Parameter;
use crate::math::tensor::Tensor;
use crate::network::state_dict::{CheckpointFormat, KeyMapping, StateDict};

/// The model boundary the trainer drives.
///
/// Predictors emit logits; the criterion owns any final squashing. All
/// parameters are reachable through `visit_parameters`, which is what the
/// optimizer, the checkpoint writer and the pretrained loaders rely on.
pub trait Predictor: Send {
    /// Inference pass with no gradient bookkeeping.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Training pass; caches whatever `backward` needs.
    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor>;

    /// Accumulates parameter gradients for ∂L/∂output.
    fn backward(&mut self, grad_output: &Tensor) -> Result<()>;

    fn visit_parameters(&mut self, visitor: &mut dyn FnMut(&str, &mut Parameter));

    fn state_dict(&self) -> StateDict;

    fn zero_grad(&mut self) {
        self.visit_parameters(&mut |_, p| p.zero_grad());
    }

    /// Strict load: every parameter must be present with a matching shape,
    /// except those `mapping` marks optional, and no key may be left over.
    fn load_state_dict(&mut self, state: &StateDict, mapping: &KeyMapping) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut failure: Option<Error> = None;
        self.visit_parameters(&mut |name, param| {
            if failure.is_some() {
                return;
            }
            match state.get(name) {
                Some(value) if value.shape() == param.value.shape() => {
                    param.value = value.clone();
                    param.zero_grad();
                    seen.insert(name.to_string());
                }
                Some(value) => {
                    failure = Some(Error::Shape(format!(
                        "parameter {} is {:?} in the checkpoint but {:?} in the model",
                        name,
                        value.shape(),
                        param.value.shape()
                    )));
                }
                None if mapping.is_optional_target(name) => {}
                None => {
                    failure = Some(Error::Config(format!(
                        "checkpoint is missing parameter {}",
                        name
                    )));
                }
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        if let Some(extra) = state.keys().find(|k| !seen.contains(*k)) {
            return Err(Error::Config(format!(
                "checkpoint has unexpected parameter {}",
                extra
            )));
        }
        Ok(())
    }

    fn load_pretrained(&mut self, path: &Path) -> Result<()> {
        let mapping = CheckpointFormat::Native.mapping();
        let state = mapping.read(path)?;
        self.load_state_dict(&state, mapping)?;
        info!(path = %path.display(), tensors = state.len(), "loaded pretrained parameters");
        Ok(())
    }

    fn load_pretrained_imagenet(&mut self, path: &Path) -> Result<()> {
        let mapping = CheckpointFormat::ImageNet.mapping();
        let state = mapping.read(path)?;
        self.load_state_dict(&state, mapping)?;
        info!(path = %path.display(), tensors = state.len(), "loaded ImageNet backbone parameters");
        Ok(())
    }
}
