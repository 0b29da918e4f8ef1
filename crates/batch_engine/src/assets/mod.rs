//! Asset loading
//!
//! Text asset formats consumed by the batch pipeline:
//!
//! - `.msh` mesh geometry ([`MeshData`]): header `MeshGeometry 1`, four counts,
//!   then tagged chunks
//! - `.anim` skeletal animation ([`Animation`]): header `MeshAnim`, frame and
//!   joint counts, frame rate, then one matrix per joint per frame
//! - `.mat` mesh materials ([`MeshMaterial`]): header `MeshMat 1`, material
//!   records, then one material index per sub-mesh
//!
//! Loaded assets are immutable. Missing files and bad headers are hard
//! errors; inconsistent array lengths are logged and tolerated.

pub mod animation;
pub mod image_loader;
pub mod material;
pub mod mesh_data;
mod tokens;

pub use animation::Animation;
pub use image_loader::ImageData;
pub use material::{MaterialEntry, MeshMaterial, TextureSet};
pub use mesh_data::{ChunkTag, MeshData, SubMesh};

use std::path::PathBuf;

use thiserror::Error;

use crate::gpu::GpuError;

/// Result type for asset loading
pub type AssetResult<T> = Result<T, AssetError>;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// File could not be opened or read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Wrong magic string, unsupported version or inconsistent references
    #[error("Invalid format in {path}: {reason}")]
    Format {
        /// File being read
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Malformed number or truncated payload
    #[error("Parse error in {path}: {reason}")]
    Parse {
        /// File being read
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Lookup outside the loaded data
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of valid entries
        len: usize,
    },

    /// A required material channel is not declared
    #[error("Material has no '{0}' channel")]
    MissingChannel(String),

    /// Image decoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Uploading decoded data failed
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

pub(crate) fn read_source(path: &std::path::Path) -> AssetResult<String> {
    std::fs::read_to_string(path).map_err(|source| {
        log::error!("Failed to open {}: {}", path.display(), source);
        AssetError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}
