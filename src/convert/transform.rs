//! Parent-linked transform records and world matrix resolution.

use glam::{DMat4, DQuat, DVec3};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::json_integer;

/// Affine object-to-world matrix.
pub type WorldTransform = DMat4;

/// One entry of the document's `transforms` collection.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRecord {
    pub id: i64,
    pub position: [f64; 3],
    /// Quaternion stored scalar-last as `[x, y, z, w]`.
    pub rotation: [f64; 4],
    pub scale: [f64; 3],
    pub parent_id: Option<i64>,
}

impl TransformRecord {
    /// Parse a transform entry. Entries that are not objects or lack an integer `id` are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let id = map.get("id").and_then(json_integer)?;

        Some(Self {
            id,
            position: numeric_or(map.get("position"), [0.0, 0.0, 0.0]),
            rotation: numeric_or(map.get("rotation"), [0.0, 0.0, 0.0, 1.0]),
            scale: numeric_or(map.get("scale"), [1.0, 1.0, 1.0]),
            parent_id: map.get("parentId").and_then(json_integer),
        })
    }

    /// `Translation * Rotation * Scale` for this record alone.
    pub fn local_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(
            DVec3::from(self.scale),
            self.rotation_quat(),
            DVec3::from(self.position),
        )
    }

    /// The record's rotation, normalized. A zero or non-finite quaternion is treated as identity.
    pub fn rotation_quat(&self) -> DQuat {
        let [x, y, z, w] = self.rotation;
        let quat = DQuat::from_xyzw(x, y, z, w);
        if quat.is_finite() && quat.length_squared() > f64::EPSILON {
            quat.normalize()
        } else {
            DQuat::IDENTITY
        }
    }
}

/// Transform records keyed by id, built once per import.
#[derive(Debug, Clone, Default)]
pub struct TransformIndex {
    records: HashMap<i64, TransformRecord>,
    parent_sentinel: i64,
}

impl TransformIndex {
    /// Index every well-formed entry. Later entries replace earlier ones with the same id.
    pub fn build(transforms: &[Value], parent_sentinel: i64) -> Self {
        let mut records = HashMap::new();
        let mut dropped = 0usize;

        for entry in transforms {
            match TransformRecord::from_json(entry) {
                Some(record) => {
                    if records.insert(record.id, record).is_some() {
                        log::debug!("Duplicate transform id; keeping the later entry");
                    }
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            log::warn!("Dropped {} malformed transform entries", dropped);
        }

        Self {
            records,
            parent_sentinel,
        }
    }

    pub fn get(&self, id: i64) -> Option<&TransformRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Compose local matrices up the parent chain of `id`.
    ///
    /// Unknown ids resolve to identity. A parent link that is the sentinel, names a
    /// missing record, or revisits a record already on the chain ends the walk, so
    /// cycles are cut at their first repeat.
    pub fn world_transform(&self, id: i64) -> WorldTransform {
        let Some(mut record) = self.records.get(&id) else {
            return DMat4::IDENTITY;
        };

        let mut visited = HashSet::new();
        visited.insert(record.id);
        let mut world = record.local_matrix();

        while let Some(parent) = self.parent_of(record) {
            if !visited.insert(parent.id) {
                log::warn!(
                    "Transform {} has a cyclic parent chain; cut at parent {}",
                    id,
                    parent.id
                );
                break;
            }
            world = parent.local_matrix() * world;
            record = parent;
        }

        world
    }

    fn parent_of(&self, record: &TransformRecord) -> Option<&TransformRecord> {
        record
            .parent_id
            .filter(|&parent| parent != self.parent_sentinel)
            .and_then(|parent| self.records.get(&parent))
    }
}

/// First `N` numbers of a JSON array, or `default` when absent, short, or non-numeric.
fn numeric_or<const N: usize>(value: Option<&Value>, default: [f64; N]) -> [f64; N] {
    let Some(values) = value.and_then(Value::as_array) else {
        return default;
    };
    if values.len() < N {
        return default;
    }

    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().zip(values) {
        match value.as_f64() {
            Some(v) => *slot = v,
            None => return default,
        }
    }
    out
}
