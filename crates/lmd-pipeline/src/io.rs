//! JSON persistence at the workspace boundary.
//!
//! Matrices are stored as 16 numbers in row-major order and keyed by
//! geometry path or overlap ID:
//!
//! - ideal matrices: `{ "<path>": [16 numbers], ... }`, non-sensor paths are
//!   skipped,
//! - overlap definitions: `{ "<id>": { "path1", "path2", "pathModule" } }`,
//! - anchor / misalignment matrices: `{ "<sensor path>": [16 numbers] }`,
//! - hit pairs: one `pairs-<id>.json` per overlap in a directory,
//!   `{ "first": [[x, y, z], ...], "second": [...] }`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use lmd_core::{
    mat4_from_row_major, mat4_to_row_major, DetectorLayout, HitPairs, Mat4, ModuleId, OverlapId,
    OverlapInfo, Real, SensorId,
};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::provider::CorrespondenceProvider;
use crate::tables::{AnchorTable, IdealGeometry};

/// Deserialize a JSON file.
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

/// Serialize `value` as pretty-printed JSON. Missing parent directories
/// are created.
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("writing {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))
}

fn parse_matrix(values: &[Real], key: &str) -> Result<Mat4> {
    mat4_from_row_major(values).with_context(|| format!("matrix for '{key}'"))
}

/// Ideal sensor matrices. Entries for modules or other volumes are ignored.
pub fn read_ideal_matrices(path: &Path) -> Result<IdealGeometry> {
    let raw: BTreeMap<String, Vec<Real>> = load_json_file(path)?;
    let mut ideal = IdealGeometry::default();
    for (key, values) in &raw {
        let Ok(sensor) = key.parse::<SensorId>() else {
            debug!("skipping non-sensor path {key}");
            continue;
        };
        ideal.insert(sensor, parse_matrix(values, key)?);
    }
    debug!("read {} ideal matrices from {}", ideal.len(), path.display());
    Ok(ideal)
}

/// Matrices keyed by sensor path; every key must be a sensor path.
pub fn read_sensor_matrices(path: &Path) -> Result<BTreeMap<SensorId, Mat4>> {
    let raw: BTreeMap<String, Vec<Real>> = load_json_file(path)?;
    raw.iter()
        .map(|(key, values)| -> Result<(SensorId, Mat4)> {
            let sensor = key
                .parse::<SensorId>()
                .with_context(|| format!("in {}", path.display()))?;
            Ok((sensor, parse_matrix(values, key)?))
        })
        .collect()
}

/// Externally measured anchor matrices.
pub fn read_anchor_matrices(path: &Path) -> Result<AnchorTable> {
    Ok(AnchorTable::new(read_sensor_matrices(path)?))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverlapRecord {
    path1: String,
    path2: String,
    path_module: String,
}

/// Overlap definitions grouped into module layouts.
pub fn read_overlap_definitions(path: &Path) -> Result<DetectorLayout> {
    let raw: BTreeMap<String, OverlapRecord> = load_json_file(path)?;
    let mut infos = Vec::with_capacity(raw.len());
    for (key, record) in &raw {
        let id: OverlapId = key.parse()?;
        let first: SensorId = record.path1.parse()?;
        let second: SensorId = record.path2.parse()?;
        let module: ModuleId = record.path_module.parse()?;
        if first.module() != module {
            bail!("overlap {id}: {first} is not on module {module}");
        }
        infos.push(OverlapInfo::new(id, first, second));
    }
    DetectorLayout::from_overlaps(infos).with_context(|| format!("in {}", path.display()))
}

/// Write overlap definitions in the format read by
/// [`read_overlap_definitions`].
pub fn write_overlap_definitions(path: &Path, layout: &DetectorLayout) -> Result<()> {
    let raw: BTreeMap<String, OverlapRecord> = layout
        .modules()
        .flat_map(|m| m.overlaps.iter())
        .map(|info| {
            (
                info.id.to_string(),
                OverlapRecord {
                    path1: info.first.path(),
                    path2: info.second.path(),
                    path_module: info.module().path(),
                },
            )
        })
        .collect();
    write_json_file(path, &raw)
}

/// Write matrices keyed by sensor path.
pub fn write_sensor_matrices(path: &Path, matrices: &BTreeMap<SensorId, Mat4>) -> Result<()> {
    let raw: BTreeMap<String, Vec<Real>> = matrices
        .iter()
        .map(|(sensor, m)| (sensor.path(), mat4_to_row_major(m).to_vec()))
        .collect();
    write_json_file(path, &raw)
}

/// Write overlap matrices keyed by overlap ID.
pub fn write_overlap_matrices(path: &Path, matrices: &BTreeMap<OverlapId, Mat4>) -> Result<()> {
    let raw: BTreeMap<String, Vec<Real>> = matrices
        .iter()
        .map(|(id, m)| (id.to_string(), mat4_to_row_major(m).to_vec()))
        .collect();
    write_json_file(path, &raw)
}

/// Directory of `pairs-<id>.json` files.
#[derive(Debug, Clone)]
pub struct JsonPairStore {
    dir: PathBuf,
}

impl JsonPairStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: OverlapId) -> PathBuf {
        self.dir.join(format!("pairs-{id}.json"))
    }

    pub fn write(&self, id: OverlapId, pairs: &HitPairs) -> Result<()> {
        write_json_file(&self.path_for(id), pairs)
    }
}

impl CorrespondenceProvider for JsonPairStore {
    fn hit_pairs(&self, id: OverlapId) -> Result<HitPairs> {
        load_json_file(&self.path_for(id))
    }
}
