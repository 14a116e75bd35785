use crate::error::DetectError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

/// Largest class index accepted from a map-form `names`.
const MAX_CLASS_INDEX: usize = 10_000;

#[derive(Deserialize)]
#[serde(untagged)]
enum Names {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

#[derive(Deserialize)]
struct SchemaFile {
    names: Names,
}

/// Class names indexed by class id, read from a YOLOv5 dataset YAML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSchema {
    names: Vec<String>,
}

impl LabelSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// `names` may be a list or an `index: name` map; gaps in the map are
    /// filled with generated labels.
    pub fn load(path: &Path) -> Result<Self, DetectError> {
        let schema = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize::<SchemaFile>())
            .map_err(|e| {
                DetectError::ModelLoad(format!("failed to load labels from {:?}: {}", path, e))
            })?;

        let names = match schema.names {
            Names::List(names) => names,
            Names::Map(map) => {
                let mut indexed = BTreeMap::new();
                for (key, name) in map {
                    let index: usize = key.trim().parse().map_err(|_| {
                        DetectError::ModelLoad(format!("invalid class index {:?} in {:?}", key, path))
                    })?;
                    if index > MAX_CLASS_INDEX {
                        return Err(DetectError::ModelLoad(format!(
                            "class index {} in {:?} exceeds {}",
                            index, path, MAX_CLASS_INDEX
                        )));
                    }
                    indexed.insert(index, name);
                }
                let len = indexed.keys().next_back().map_or(0, |last| last + 1);
                (0..len)
                    .map(|i| indexed.remove(&i).unwrap_or_else(|| fallback_label(i as u32)))
                    .collect()
            }
        };

        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn label(&self, class_id: u32) -> String {
        self.names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| fallback_label(class_id))
    }

    pub fn color(&self, class_id: u32) -> [u8; 3] {
        PALETTE[class_id as usize % PALETTE.len()]
    }
}

fn fallback_label(class_id: u32) -> String {
    format!("class_{}", class_id)
}
