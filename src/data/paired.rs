use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use tracing::info;

use crate::data::augment::Augmenter;
use crate::data::sample::{Dataset, Sample};
use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "JPG", "PNG"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e))
}

/// Image files directly under `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub(crate) fn open_rgb(path: &Path) -> Result<image::RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| Error::Image { path: path.to_path_buf(), source })
}

fn open_luma(path: &Path) -> Result<image::GrayImage> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|source| Error::Image { path: path.to_path_buf(), source })
}

/// Image-to-image dataset over an input directory and a label directory.
///
/// Entries are paired by position after sorting each listing, not by file
/// stem: the two directories must name their files consistently.
#[derive(Debug)]
pub struct PairedDirDataset {
    inputs: Vec<PathBuf>,
    targets: Vec<PathBuf>,
    augmenter: Augmenter,
}

impl PairedDirDataset {
    pub fn new(x_dir: &Path, y_dir: &Path, augmenter: Augmenter) -> Result<PairedDirDataset> {
        let inputs = list_images(x_dir)?;
        let targets = list_images(y_dir)?;
        if inputs.len() != targets.len() {
            return Err(Error::Config(format!(
                "{} holds {} images but {} holds {}",
                x_dir.display(),
                inputs.len(),
                y_dir.display(),
                targets.len()
            )));
        }
        info!(
            inputs = %x_dir.display(),
            targets = %y_dir.display(),
            samples = inputs.len(),
            mode = ?augmenter.mode(),
            "paired dataset ready"
        );
        Ok(PairedDirDataset { inputs, targets, augmenter })
    }

    pub fn pair(&self, index: usize) -> Option<(&Path, &Path)> {
        Some((self.inputs.get(index)?.as_path(), self.targets.get(index)?.as_path()))
    }
}

impl Dataset for PairedDirDataset {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample> {
        let (x, y) = self.pair(index).ok_or_else(|| {
            Error::Shape(format!("index {} out of range for {} samples", index, self.len()))
        })?;
        let (input, target) = self.augmenter.apply_pair(open_rgb(x)?, open_luma(y)?, rng)?;
        Ok(Sample {
            input,
            target,
            input_id: x.to_path_buf(),
            target_id: Some(y.to_path_buf()),
        })
    }
}
