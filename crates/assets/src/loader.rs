use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::{AssetError, Geometry, Texture};

/// Turns asset paths into loaded handles.
///
/// Loads run on the runtime's thread; implementations must not block it.
#[async_trait(?Send)]
pub trait AssetLoader {
    async fn load_geometry(&self, path: &str) -> Result<Geometry, AssetError>;
    async fn load_texture(&self, path: &str) -> Result<Texture, AssetError>;
}

/// Loads assets from files below a root directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `path` below the root. A leading `/` means the root itself;
    /// `..` and drive prefixes are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(AssetError::OutsideRoot(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound(path.to_string())
            } else {
                AssetError::Io {
                    path: path.to_string(),
                    source,
                }
            }
        })
    }
}

#[async_trait(?Send)]
impl AssetLoader for FsLoader {
    async fn load_geometry(&self, path: &str) -> Result<Geometry, AssetError> {
        let bytes = self.read(path).await?;
        let geometry = Geometry::from_obj(path, bytes)?;
        tracing::debug!(
            path,
            vertices = geometry.vertex_count,
            faces = geometry.face_count,
            "geometry loaded"
        );
        Ok(geometry)
    }

    async fn load_texture(&self, path: &str) -> Result<Texture, AssetError> {
        let bytes = self.read(path).await?;
        tracing::debug!(path, bytes = bytes.len(), "texture loaded");
        Ok(Texture::new(path, bytes))
    }
}

/// Serves synthesized assets from memory, with optional latency and
/// injected failures. Counts every load it serves.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    geometries: HashMap<String, Geometry>,
    textures: HashMap<String, Texture>,
    failing: HashSet<String>,
    latency: Duration,
    geometry_loads: Cell<usize>,
    texture_loads: Cell<usize>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a unit cube at `path`.
    pub fn with_geometry(mut self, path: &str) -> Self {
        self.geometries
            .insert(path.to_string(), Geometry::unit_cube(path));
        self
    }

    /// Serve a one-pixel texture at `path`.
    pub fn with_texture(mut self, path: &str) -> Self {
        self.textures
            .insert(path.to_string(), Texture::new(path, vec![255, 255, 255, 255]));
        self
    }

    /// Make every load of `path` fail.
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    /// Delay every load by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn geometry_loads(&self) -> usize {
        self.geometry_loads.get()
    }

    pub fn texture_loads(&self) -> usize {
        self.texture_loads.get()
    }

    async fn simulate(&self, path: &str) -> Result<(), AssetError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.contains(path) {
            return Err(AssetError::Failed {
                path: path.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl AssetLoader for MemoryLoader {
    async fn load_geometry(&self, path: &str) -> Result<Geometry, AssetError> {
        self.geometry_loads.set(self.geometry_loads.get() + 1);
        self.simulate(path).await?;
        self.geometries
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }

    async fn load_texture(&self, path: &str) -> Result<Texture, AssetError> {
        self.texture_loads.set(self.texture_loads.get() + 1);
        self.simulate(path).await?;
        self.textures
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }
}
