#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ferrite_train::data::loader::{BatchLoader, LoaderOptions};
use ferrite_train::data::sample::{Dataset, Sample};
use ferrite_train::data::Mode;
use ferrite_train::layers::Parameter;
use ferrite_train::network::StateDict;
use ferrite_train::{Predictor, Result, Tensor};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;

/// Writes `n` paired 4×4 PNGs: the red channel is 0 on the left half and
/// 255 on the right; the label is 0/255 to match.
pub fn write_paired_fixture(root: &Path, n: usize) -> (PathBuf, PathBuf) {
    let x = root.join("x");
    let y = root.join("y");
    std::fs::create_dir_all(&x).unwrap();
    std::fs::create_dir_all(&y).unwrap();
    for i in 0..n {
        let image = RgbImage::from_fn(4, 4, |px, py| {
            let r = if px < 2 { 0 } else { 255 };
            Rgb([r, (py * 40 + i as u32 * 10) as u8, 30])
        });
        let label = GrayImage::from_fn(4, 4, |px, _| Luma([if px < 2 { 0 } else { 255 }]));
        image.save(x.join(format!("{:03}.png", i))).unwrap();
        label.save(y.join(format!("{:03}.png", i))).unwrap();
    }
    (x, y)
}

/// In-memory label-map dataset: a `[1, 2, 2]` input that equals its
/// `[1, 2, 2]` target, with labels alternating between classes 0 and 1.
pub struct LabelEcho(pub usize);

impl Dataset for LabelEcho {
    fn len(&self) -> usize {
        self.0
    }

    fn get(&self, index: usize, _rng: &mut StdRng) -> Result<Sample> {
        let labels = vec![0.0, 1.0, (index % 2) as f32, 1.0];
        Ok(Sample {
            input: Tensor::from_vec(&[1, 2, 2], labels.clone())?,
            target: Tensor::from_vec(&[1, 2, 2], labels)?,
            input_id: PathBuf::from(format!("mem/{}", index)),
            target_id: None,
        })
    }
}

pub fn loader(samples: usize, batch_size: usize, mode: Mode) -> BatchLoader {
    let options = LoaderOptions { batch_size, ..LoaderOptions::default() };
    BatchLoader::new(Arc::new(LabelEcho(samples)), mode, options, 7).unwrap()
}

/// Two-class predictor with no parameters and scripted outputs.
///
/// Training passes emit zero logits, or NaN on the configured call.
/// Evaluation pass `k` (0-based) predicts class 0 everywhere while
/// `k < perfect_from`, and echoes the input label afterwards.
pub struct Scripted {
    pub train_calls: Arc<AtomicUsize>,
    pub eval_calls: Arc<AtomicUsize>,
    pub nan_on_train_call: Option<usize>,
    pub perfect_from: usize,
}

impl Scripted {
    pub fn new() -> Scripted {
        Scripted {
            train_calls: Arc::new(AtomicUsize::new(0)),
            eval_calls: Arc::new(AtomicUsize::new(0)),
            nan_on_train_call: None,
            perfect_from: usize::MAX,
        }
    }
}

fn logits_for(input: &Tensor, echo: bool) -> Result<Tensor> {
    let (n, _, h, w) = input.dims4()?;
    let plane = h * w;
    let mut out = vec![0.0; n * 2 * plane];
    for b in 0..n {
        for p in 0..plane {
            let class = if echo { input.data()[b * plane + p] as usize } else { 0 };
            out[(b * 2 + class) * plane + p] = 1.0;
        }
    }
    Tensor::from_vec(&[n, 2, h, w], out)
}

impl Predictor for Scripted {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let pass = self.eval_calls.fetch_add(1, Ordering::SeqCst);
        logits_for(input, pass >= self.perfect_from)
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let call = self.train_calls.fetch_add(1, Ordering::SeqCst);
        let (n, _, h, w) = input.dims4()?;
        let fill = if Some(call) == self.nan_on_train_call { f32::NAN } else { 0.0 };
        Ok(Tensor::filled(&[n, 2, h, w], fill))
    }

    fn backward(&mut self, _grad_output: &Tensor) -> Result<()> {
        Ok(())
    }

    fn visit_parameters(&mut self, _visitor: &mut dyn FnMut(&str, &mut Parameter)) {}

    fn state_dict(&self) -> StateDict {
        StateDict::default()
    }
}
