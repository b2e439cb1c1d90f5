//! Overlap topology of detector modules.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{ModuleId, OverlapId, SensorId, SENSORS_PER_MODULE};

/// Sensor pairs `(first, second)` for each local overlap index of a module
/// in the reference geometry.
///
/// Reconstructed from the sensor chains used to relate sensors through
/// overlaps (e.g. sensor 0 reaches sensor 5 through overlaps 4, 1 and 3,
/// and sensor 3 either through 4, 5, 6, 2 or through 4, 1, 7, 8),
/// with sensors counted from 0. It is not read from the detector geometry;
/// runs on real data should pass their own overlap definitions.
///
/// The graph is connected and contains one cycle
/// (`7-2-6-3-8-1-7`), so two independent paths exist between some sensors.
pub const REFERENCE_OVERLAP_PAIRS: [(u8, u8); 9] = [
    (0, 4),
    (2, 7),
    (3, 8),
    (2, 5),
    (0, 7),
    (1, 7),
    (1, 8),
    (2, 6),
    (3, 6),
];

/// Errors raised while assembling a detector layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The two sensors of an overlap sit on different modules, or the
    /// overlap ID encodes a different module than its sensors.
    #[error("overlap {id} does not belong to module {module}")]
    ForeignOverlap { id: OverlapId, module: ModuleId },
    /// An overlap references a sensor the module does not list.
    #[error("overlap {id} references sensor {sensor} which is not part of its module")]
    UnknownSensor { id: OverlapId, sensor: SensorId },
    /// The same overlap ID was given twice.
    #[error("duplicate overlap {0}")]
    DuplicateOverlap(OverlapId),
    /// An overlap pairs a sensor with itself.
    #[error("overlap {0} pairs a sensor with itself")]
    SelfOverlap(OverlapId),
}

/// One overlap region between two sensors of the same module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapInfo {
    pub id: OverlapId,
    pub first: SensorId,
    pub second: SensorId,
}

impl OverlapInfo {
    pub fn new(id: OverlapId, first: SensorId, second: SensorId) -> Self {
        Self { id, first, second }
    }

    pub fn module(&self) -> ModuleId {
        self.first.module()
    }

    /// The other sensor of the pair, if `sensor` takes part in this overlap.
    pub fn partner(&self, sensor: SensorId) -> Option<SensorId> {
        if sensor == self.first {
            Some(self.second)
        } else if sensor == self.second {
            Some(self.first)
        } else {
            None
        }
    }

    fn validate(&self) -> Result<(), LayoutError> {
        let module = self.first.module();
        if self.second.module() != module || self.id.module() != module {
            return Err(LayoutError::ForeignOverlap {
                id: self.id,
                module,
            });
        }
        if self.first == self.second {
            return Err(LayoutError::SelfOverlap(self.id));
        }
        Ok(())
    }
}

/// Sensors and overlaps of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLayout {
    pub module: ModuleId,
    pub sensors: BTreeSet<SensorId>,
    pub overlaps: Vec<OverlapInfo>,
}

impl ModuleLayout {
    /// Build a layout and check that every overlap belongs to `module` and
    /// only references listed sensors.
    pub fn new(
        module: ModuleId,
        sensors: impl IntoIterator<Item = SensorId>,
        overlaps: Vec<OverlapInfo>,
    ) -> Result<Self, LayoutError> {
        let sensors: BTreeSet<SensorId> = sensors.into_iter().collect();
        let mut seen = BTreeSet::new();

        for info in &overlaps {
            info.validate()?;
            if info.module() != module {
                return Err(LayoutError::ForeignOverlap {
                    id: info.id,
                    module,
                });
            }
            for sensor in [info.first, info.second] {
                if !sensors.contains(&sensor) {
                    return Err(LayoutError::UnknownSensor {
                        id: info.id,
                        sensor,
                    });
                }
            }
            if !seen.insert(info.id) {
                return Err(LayoutError::DuplicateOverlap(info.id));
            }
        }

        Ok(Self {
            module,
            sensors,
            overlaps,
        })
    }

    /// Layout of `module` in the reference geometry.
    pub fn reference(module: ModuleId) -> Self {
        let sensors = (0..SENSORS_PER_MODULE).map(|s| module.sensor(s)).collect();
        let overlaps = REFERENCE_OVERLAP_PAIRS
            .iter()
            .enumerate()
            .map(|(local, &(a, b))| {
                OverlapInfo::new(
                    OverlapId::new(module.half, module.plane, module.module, local as u8),
                    module.sensor(a),
                    module.sensor(b),
                )
            })
            .collect();

        Self {
            module,
            sensors,
            overlaps,
        }
    }

    pub fn overlap_ids(&self) -> impl Iterator<Item = OverlapId> + '_ {
        self.overlaps.iter().map(|o| o.id)
    }
}

/// Module layouts of the whole detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorLayout {
    modules: BTreeMap<ModuleId, ModuleLayout>,
}

impl DetectorLayout {
    /// All 40 modules of the reference geometry.
    pub fn reference() -> Self {
        let modules = ModuleId::all()
            .map(|m| (m, ModuleLayout::reference(m)))
            .collect();
        Self { modules }
    }

    /// Group overlap definitions by module. Module sensor sets are the
    /// sensors referenced by the overlaps; see [`Self::include_sensors`] for
    /// sensors that no overlap mentions.
    pub fn from_overlaps(
        infos: impl IntoIterator<Item = OverlapInfo>,
    ) -> Result<Self, LayoutError> {
        let mut grouped: BTreeMap<ModuleId, Vec<OverlapInfo>> = BTreeMap::new();
        for info in infos {
            info.validate()?;
            grouped.entry(info.module()).or_default().push(info);
        }

        let mut modules = BTreeMap::new();
        for (module, mut overlaps) in grouped {
            overlaps.sort_by_key(|o| o.id);
            let sensors: Vec<SensorId> = overlaps
                .iter()
                .flat_map(|o| [o.first, o.second])
                .collect();
            modules.insert(module, ModuleLayout::new(module, sensors, overlaps)?);
        }

        Ok(Self { modules })
    }

    /// Add sensors to their modules, creating empty module layouts where
    /// needed. Sensors without overlaps stay unreachable and are reported
    /// when their module is combined.
    pub fn include_sensors(&mut self, sensors: impl IntoIterator<Item = SensorId>) {
        for sensor in sensors {
            let module = sensor.module();
            self.modules
                .entry(module)
                .or_insert_with(|| ModuleLayout {
                    module,
                    sensors: BTreeSet::new(),
                    overlaps: Vec::new(),
                })
                .sensors
                .insert(sensor);
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleLayout> {
        self.modules.values()
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ModuleLayout> {
        self.modules.get(id)
    }

    /// Every overlap ID of the detector, in ascending order.
    pub fn overlap_ids(&self) -> Vec<OverlapId> {
        self.modules
            .values()
            .flat_map(|m| m.overlap_ids())
            .collect()
    }

    pub fn overlap(&self, id: OverlapId) -> Option<&OverlapInfo> {
        self.modules
            .get(&id.module())
            .and_then(|m| m.overlaps.iter().find(|o| o.id == id))
    }
}
