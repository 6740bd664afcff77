//! Asset loading: opaque geometry and texture handles produced by async loaders.
//!
//! The runtime never inspects asset contents. Loaders turn a path into a handle;
//! the render layer builds materials and instance buffers from those handles.

mod loader;

pub use loader::{AssetLoader, FsLoader, MemoryLoader};

use std::sync::Arc;

/// Errors from asset loading.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("asset path {0} leaves the asset root")]
    OutsideRoot(String),
    #[error("geometry file {0} contains no vertices")]
    EmptyGeometry(String),
    #[error("failed to load {path}: {reason}")]
    Failed { path: String, reason: String },
}

/// Loaded geometry. Cheap to clone; the vertex data is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub path: String,
    pub vertex_count: u32,
    pub face_count: u32,
    data: Arc<[u8]>,
}

impl Geometry {
    /// Wrap raw OBJ source. Only `v` and `f` records are counted; the data is
    /// kept as-is for the backend.
    pub fn from_obj(path: &str, bytes: Vec<u8>) -> Result<Self, AssetError> {
        let text = String::from_utf8_lossy(&bytes);
        let mut vertex_count = 0u32;
        let mut face_count = 0u32;
        for line in text.lines() {
            let line = line.trim_start();
            if line.starts_with("v ") {
                vertex_count += 1;
            } else if line.starts_with("f ") {
                face_count += 1;
            }
        }
        if vertex_count == 0 {
            return Err(AssetError::EmptyGeometry(path.to_string()));
        }
        Ok(Self {
            path: path.to_string(),
            vertex_count,
            face_count,
            data: bytes.into(),
        })
    }

    /// A unit cube, used for synthesized assets.
    pub fn unit_cube(path: &str) -> Self {
        Self {
            path: path.to_string(),
            vertex_count: 8,
            face_count: 12,
            data: Arc::from(&[][..]),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Loaded texture. Cheap to clone; the pixel data is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub path: String,
    data: Arc<[u8]>,
}

impl Texture {
    pub fn new(path: &str, bytes: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            data: bytes.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

pub fn crate_info() -> &'static str {
    "gravy-assets v0.1.0"
}
