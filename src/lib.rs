//! Reconstruct triangle meshes from Genesis (Build To Order) JSON exports.
//!
//! Attribute arrays are located by name or by shape, transforms are resolved
//! through parent chains, and each object is handed to a [`scene::MeshSink`].
//! Collected scenes can be written as glTF or COLLADA.

pub mod config;
pub mod convert;
pub mod document;
pub mod export;
pub mod scene;

pub use config::{AttributeQuery, ImportConfig};
pub use convert::mesh::{ReconstructedMesh, SkipReason};
pub use convert::{import, ImportReport, SkippedObject};
pub use document::{parse_document, read_document, DocumentError};
