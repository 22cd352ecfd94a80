//! Importing Genesis (Build To Order) JSON documents.
//!
//! The document has no fixed schema. Objects are read from `objects` (or
//! `meshes`), transforms from `transforms`, and attribute arrays are found
//! by name or shape anywhere inside each object record.
//!
//! ```ignore
//! use genesis_importer::{convert, document, scene::SceneCollector, ImportConfig};
//!
//! let doc = document::read_document(path)?;
//! let mut scene = SceneCollector::new();
//! let report = convert::import(&doc, &ImportConfig::default(), &mut scene);
//! println!("Imported {} object(s)", report.imported_count());
//! ```

pub mod locate;
pub mod mesh;
pub mod transform;

use serde_json::Value;

use crate::config::ImportConfig;
use crate::scene::MeshSink;
use mesh::{object_name, reconstruct_object, ReconstructedMesh, SkipReason};
use transform::TransformIndex;

/// An object record that produced no mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedObject {
    /// Position in the object collection.
    pub index: usize,
    pub name: String,
    pub reason: SkipReason,
}

/// Result of importing one document.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub meshes: Vec<ReconstructedMesh>,
    pub skipped: Vec<SkippedObject>,
}

impl ImportReport {
    pub fn imported_count(&self) -> usize {
        self.meshes.len()
    }
}

/// Reconstruct every object in `document`, handing each mesh to `sink`.
///
/// Problems with individual objects are recorded in [`ImportReport::skipped`]
/// and never stop the batch.
pub fn import<S: MeshSink>(document: &Value, config: &ImportConfig, sink: &mut S) -> ImportReport {
    let mut report = ImportReport::default();

    if !document.is_object() {
        log::warn!("Document root is not a JSON object; nothing to import");
        return report;
    }

    let transforms = TransformIndex::build(
        document
            .get(&config.transforms_key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        config.parent_sentinel,
    );
    let objects = object_collection(document, config);
    log::debug!(
        "Importing {} object records with {} transforms",
        objects.len(),
        transforms.len()
    );

    for (index, record) in objects.iter().enumerate() {
        match reconstruct_object(record, index, &transforms, config, sink) {
            Ok(mesh) => report.meshes.push(mesh),
            Err(reason) => {
                let name = record
                    .as_object()
                    .map(|map| object_name(map, index, config))
                    .unwrap_or_else(|| config.fallback_name(index));
                log::warn!("Skipping object '{}' (index {}): {}", name, index, reason);
                report.skipped.push(SkippedObject {
                    index,
                    name,
                    reason,
                });
            }
        }
    }

    log::info!(
        "Imported {} object(s), skipped {}",
        report.imported_count(),
        report.skipped.len()
    );
    report
}

/// The first collection key holding a non-empty array.
fn object_collection<'a>(document: &'a Value, config: &ImportConfig) -> &'a [Value] {
    config
        .object_collection_keys
        .iter()
        .filter_map(|key| document.get(key).and_then(Value::as_array))
        .find(|objects| !objects.is_empty())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// An integral JSON number as `i64`. Floats with a fractional part are rejected.
pub(crate) fn json_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}
