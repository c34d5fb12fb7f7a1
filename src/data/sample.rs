use std::path::PathBuf;

use rand::rngs::StdRng;

use crate::error::Result;
use crate::math::tensor::Tensor;

/// One augmented example, with the files it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Tensor,
    pub target: Tensor,
    pub input_id: PathBuf,
    /// Source of the target. `None` for manifest datasets, which carry
    /// targets inline; it stands in for the constant-zero placeholder a
    /// vector loader returns in place of a target path.
    pub target_id: Option<PathBuf>,
}

/// Indexable source of augmented samples.
///
/// `get` must be a pure function of `(index, rng state)` so batches do not
/// depend on which prefetch worker produced them.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample>;
}
