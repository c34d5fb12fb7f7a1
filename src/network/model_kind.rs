use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::network::pixel::PixelClassifier;
use crate::network::pooled::PooledClassifier;
use crate::network::predictor::Predictor;
use crate::registry::name_registry;

/// Built-in predictor architectures, selected by `model_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    PixelMlp,
    PooledMlp,
}

name_registry!(ModelKind, "model", {
    "PixelMLP" => PixelMlp,
    "PooledMLP" => PooledMlp,
});

impl ModelKind {
    /// Whether the model emits a label map (`true`) or one vector per sample.
    pub fn is_dense(&self) -> bool {
        matches!(self, ModelKind::PixelMlp)
    }

    pub fn build<R: Rng + ?Sized>(
        &self,
        in_channels: usize,
        hidden: &[usize],
        outputs: usize,
        rng: &mut R,
    ) -> Box<dyn Predictor> {
        match self {
            ModelKind::PixelMlp => Box::new(PixelClassifier::new(in_channels, hidden, outputs, rng)),
            ModelKind::PooledMlp => Box::new(PooledClassifier::new(in_channels, hidden, outputs, rng)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn unknown_model_is_a_configuration_error() {
        let err = "Swin".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn names_roundtrip_through_serde() {
        let json = serde_json::to_string(&ModelKind::PooledMlp).unwrap();
        assert_eq!(json, "\"PooledMLP\"");
        let back: ModelKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ModelKind::PooledMlp);
    }
}
