use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::error::Result;
use crate::layers::parameter::Parameter;
use crate::math::tensor::Tensor;
use crate::network::network::Network;
use crate::network::predictor::Predictor;
use crate::network::spec;
use crate::network::state_dict::StateDict;

/// Image-to-image predictor: the same dense network applied to every pixel,
/// i.e. a stack of 1x1 convolutions. `[N, C, H, W] -> [N, K, H, W]`.
#[derive(Debug, Clone)]
pub struct PixelClassifier {
    body: Network,
    cached_dims: Option<(usize, usize, usize)>,
}

impl PixelClassifier {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        hidden: &[usize],
        num_classes: usize,
        rng: &mut R,
    ) -> PixelClassifier {
        let specs = spec::chain(
            in_channels,
            hidden,
            num_classes,
            ActivationFunction::ReLU,
            ActivationFunction::Identity,
        );
        PixelClassifier { body: Network::new(&specs, rng), cached_dims: None }
    }
}

impl Predictor for PixelClassifier {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (n, _, h, w) = input.dims4()?;
        let rows = self.body.forward(&input.nchw_to_rows()?)?;
        rows.rows_to_nchw(n, h, w)
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let (n, _, h, w) = input.dims4()?;
        let rows = self.body.forward_train(&input.nchw_to_rows()?)?;
        self.cached_dims = Some((n, h, w));
        rows.rows_to_nchw(n, h, w)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<()> {
        self.body.backward(&grad_output.nchw_to_rows()?)?;
        self.cached_dims = None;
        Ok(())
    }

    fn visit_parameters(&mut self, visitor: &mut dyn FnMut(&str, &mut Parameter)) {
        self.body.visit_parameters("body.", visitor);
    }

    fn state_dict(&self) -> StateDict {
        StateDict::from_named(self.body.named_values("body."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn keeps_spatial_shape_and_maps_channels_to_classes() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = PixelClassifier::new(3, &[8], 2, &mut rng);
        let out = model.forward(&Tensor::zeros(&[2, 3, 4, 5])).unwrap();
        assert_eq!(out.shape(), &[2, 2, 4, 5]);
    }

    #[test]
    fn train_and_inference_passes_agree() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut model = PixelClassifier::new(2, &[4], 3, &mut rng);
        let input = Tensor::from_vec(&[1, 2, 1, 2], vec![0.1, 0.2, -0.3, 0.4]).unwrap();
        let a = model.forward(&input).unwrap();
        let b = model.forward_train(&input).unwrap();
        assert_eq!(a, b);
    }
}
