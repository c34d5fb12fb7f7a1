use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::info;

use crate::data::augment::Augmenter;
use crate::data::paired::open_rgb;
use crate::data::sample::{Dataset, Sample};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Length of every manifest target vector.
pub const TARGET_WIDTH: usize = 6;

/// One manifest row: image location relative to the manifest, six targets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestRow {
    pub sub_path: String,
    pub image_file_name: String,
    pub value_1: f32,
    pub value_2: f32,
    pub value_3: f32,
    pub value_4: f32,
    pub value_5: f32,
    pub value_6: f32,
}

impl ManifestRow {
    pub fn values(&self) -> [f32; TARGET_WIDTH] {
        [self.value_1, self.value_2, self.value_3, self.value_4, self.value_5, self.value_6]
    }
}

/// Image-to-vector dataset described by a CSV manifest.
#[derive(Debug)]
pub struct CsvDataset {
    root: PathBuf,
    rows: Vec<ManifestRow>,
    augmenter: Augmenter,
}

impl CsvDataset {
    pub fn new(csv_path: &Path, augmenter: Augmenter) -> Result<CsvDataset> {
        let csv_err = |source: csv::Error| Error::Csv { path: csv_path.to_path_buf(), source };
        let mut reader = csv::Reader::from_path(csv_path).map_err(csv_err)?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ManifestRow>, csv::Error>>()
            .map_err(csv_err)?;
        let root = csv_path.parent().map(Path::to_path_buf).unwrap_or_default();
        info!(manifest = %csv_path.display(), samples = rows.len(), mode = ?augmenter.mode(), "manifest dataset ready");
        Ok(CsvDataset { root, rows, augmenter })
    }

    pub fn image_path(&self, row: &ManifestRow) -> PathBuf {
        self.root.join(&row.sub_path).join(&row.image_file_name)
    }

    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }
}

impl Dataset for CsvDataset {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample> {
        let row = self.rows.get(index).ok_or_else(|| {
            Error::Shape(format!("index {} out of range for {} samples", index, self.rows.len()))
        })?;
        let path = self.image_path(row);
        let input = self.augmenter.apply_image(open_rgb(&path)?, rng)?;
        let target = Tensor::from_vec(&[TARGET_WIDTH], row.values().to_vec())?;
        Ok(Sample { input, target, input_id: path, target_id: None })
    }
}
