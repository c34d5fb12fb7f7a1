use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::parameter::Parameter;
use crate::math::tensor::Tensor;
use crate::network::network::Network;
use crate::network::predictor::Predictor;
use crate::network::spec;
use crate::network::state_dict::StateDict;

/// Image-to-vector predictor: per-pixel stem, global average pool, dense head.
/// `[N, C, H, W] -> [N, K]`.
#[derive(Debug, Clone)]
pub struct PooledClassifier {
    stem: Network,
    head: Network,
    cached_dims: Option<(usize, usize)>,
}

impl PooledClassifier {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        hidden: &[usize],
        outputs: usize,
        rng: &mut R,
    ) -> PooledClassifier {
        let (stem_hidden, width) = match hidden.split_last() {
            Some((&last, rest)) => (rest, last),
            None => (&[][..], in_channels),
        };
        let stem_specs = spec::chain(
            in_channels,
            stem_hidden,
            width,
            ActivationFunction::ReLU,
            ActivationFunction::ReLU,
        );
        let head_specs = spec::chain(width, &[], outputs, ActivationFunction::ReLU, ActivationFunction::Identity);
        PooledClassifier {
            stem: Network::new(&stem_specs, rng),
            head: Network::new(&head_specs, rng),
            cached_dims: None,
        }
    }

    fn pool(features: &Tensor, n: usize, plane: usize) -> Result<Tensor> {
        let (_, width) = features.dims2()?;
        let mut pooled = vec![0.0f32; n * width];
        for (row_idx, row) in features.data().chunks(width).enumerate() {
            let b = row_idx / plane;
            for (acc, &v) in pooled[b * width..(b + 1) * width].iter_mut().zip(row) {
                *acc += v;
            }
        }
        let inv = 1.0 / plane as f32;
        for v in &mut pooled {
            *v *= inv;
        }
        Tensor::from_vec(&[n, width], pooled)
    }
}

impl Predictor for PooledClassifier {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (n, _, h, w) = input.dims4()?;
        let features = self.stem.forward(&input.nchw_to_rows()?)?;
        let pooled = Self::pool(&features, n, h * w)?;
        self.head.forward(&pooled)
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let (n, _, h, w) = input.dims4()?;
        let features = self.stem.forward_train(&input.nchw_to_rows()?)?;
        let pooled = Self::pool(&features, n, h * w)?;
        self.cached_dims = Some((n, h * w));
        self.head.forward_train(&pooled)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<()> {
        let (n, plane) = self
            .cached_dims
            .take()
            .ok_or_else(|| Error::Shape("backward called before forward_train".into()))?;
        let grad_pooled = self.head.backward(grad_output)?;
        let (_, width) = grad_pooled.dims2()?;

        // Average pooling spreads each sample's gradient evenly over its pixels.
        let inv = 1.0 / plane as f32;
        let mut spread = Vec::with_capacity(n * plane * width);
        for b in 0..n {
            let g = &grad_pooled.data()[b * width..(b + 1) * width];
            for _ in 0..plane {
                spread.extend(g.iter().map(|v| v * inv));
            }
        }
        let grad_rows = Tensor::from_vec(&[n * plane, width], spread)?;
        self.stem.backward(&grad_rows)?;
        Ok(())
    }

    fn visit_parameters(&mut self, visitor: &mut dyn FnMut(&str, &mut Parameter)) {
        self.stem.visit_parameters("stem.", visitor);
        self.head.visit_parameters("head.", visitor);
    }

    fn state_dict(&self) -> StateDict {
        let mut named = self.stem.named_values("stem.");
        named.extend(self.head.named_values("head."));
        StateDict::from_named(named)
    }
}
