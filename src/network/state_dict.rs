use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Named parameter values, keyed like `body.layers.0.weights`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDict(pub BTreeMap<String, Tensor>);

impl StateDict {
    pub fn from_named(named: Vec<(String, Tensor)>) -> StateDict {
        StateDict(named.into_iter().collect())
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

/// Which external layout a pretrained parameter file follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// Files written by this crate (optionally under a data-parallel `module.` wrapper).
    Native,
    /// Public ImageNet backbone releases: parameters under `model`, with a
    /// classifier head and attention-mask buffers that must not be loaded.
    ImageNet,
}

impl CheckpointFormat {
    /// Picks the ImageNet layout when the file path mentions it.
    pub fn detect(path: &Path) -> CheckpointFormat {
        if path.to_string_lossy().to_lowercase().contains("imagenet") {
            CheckpointFormat::ImageNet
        } else {
            CheckpointFormat::Native
        }
    }

    pub fn mapping(self) -> &'static KeyMapping {
        KEY_MAPPINGS
            .iter()
            .find(|m| m.format == self)
            .unwrap_or(&KEY_MAPPINGS[0])
    }
}

/// Key-remapping rules for one checkpoint format.
#[derive(Debug)]
pub struct KeyMapping {
    pub format: CheckpointFormat,
    pub version: u32,
    /// Object key holding the parameter map, if the file wraps it.
    pub payload_key: Option<&'static str>,
    /// Wrapper prefixes removed from every key, in order.
    pub strip_prefixes: &'static [&'static str],
    /// Source keys starting with one of these are discarded.
    pub drop_prefixes: &'static [&'static str],
    /// Source keys ending with one of these are discarded.
    pub drop_suffixes: &'static [&'static str],
    /// Target parameters under these prefixes are left untouched and are not
    /// required to be present in the file.
    pub optional_targets: &'static [&'static str],
}

pub const KEY_MAPPINGS: &[KeyMapping] = &[
    KeyMapping {
        format: CheckpointFormat::Native,
        version: 1,
        payload_key: Some("state"),
        strip_prefixes: &["module."],
        drop_prefixes: &[],
        drop_suffixes: &[],
        optional_targets: &[],
    },
    KeyMapping {
        format: CheckpointFormat::ImageNet,
        version: 1,
        payload_key: Some("model"),
        strip_prefixes: &["module."],
        drop_prefixes: &["head."],
        drop_suffixes: &["attn_mask"],
        // The auxiliary output norms and the task head have no counterpart
        // in the public release.
        optional_targets: &["head.", "norm"],
    },
];

impl KeyMapping {
    pub fn remap(&self, raw: StateDict) -> StateDict {
        let mut out = BTreeMap::new();
        for (key, value) in raw.0 {
            let mut key = key.as_str();
            for prefix in self.strip_prefixes {
                key = key.strip_prefix(prefix).unwrap_or(key);
            }
            if self.drop_prefixes.iter().any(|p| key.starts_with(p))
                || self.drop_suffixes.iter().any(|s| key.ends_with(s))
            {
                continue;
            }
            out.insert(key.to_string(), value);
        }
        StateDict(out)
    }

    pub fn is_optional_target(&self, name: &str) -> bool {
        self.optional_targets.iter().any(|p| name.starts_with(p))
    }

    /// Reads a parameter file and applies this mapping.
    ///
    /// A file whose top-level object carries `payload_key` is unwrapped;
    /// otherwise the whole object is taken as the parameter map.
    pub fn read(&self, path: &Path) -> Result<StateDict> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let mut value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| Error::json(path, e))?;
        if let Some(key) = self.payload_key {
            if let Some(inner) = value.get_mut(key) {
                value = inner.take();
            }
        }
        let raw: StateDict = serde_json::from_value(value).map_err(|e| Error::json(path, e))?;
        Ok(self.remap(raw))
    }
}
