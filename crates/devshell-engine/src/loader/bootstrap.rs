//! Bootstrap resources
//!
//! Bootstrap types are part of the session infrastructure and are never
//! compiled by the external compiler. Their images are read once, when the
//! session is built, from a resource location and are never rewritten.

use crate::error::{BridgeError, BridgeResult};
use devshell_bytecode::descriptor::binary_to_internal;
use rustc_hash::FxHashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extension of stored images
pub const IMAGE_EXTENSION: &str = "img";

/// Source of bootstrap images
pub trait ResourceLocator: Send + Sync {
    /// Read a resource by relative path
    ///
    /// A missing resource is reported as [`io::ErrorKind::NotFound`].
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Resources stored under a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    /// Create a locator rooted at a directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLocator for DirectoryResources {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}

/// Resources held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticResources {
    entries: FxHashMap<PathBuf, Vec<u8>>,
}

impl StaticResources {
    /// Create an empty set of resources
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource (builder style)
    pub fn with_resource(mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        self.entries.insert(path.into(), bytes);
        self
    }
}

impl ResourceLocator for StaticResources {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// Relative resource path of a type's image: `a/b/Outer$Inner.img`
pub fn resource_path(binary_name: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", binary_to_internal(binary_name), IMAGE_EXTENSION))
}

/// Read every bootstrap image
///
/// # Arguments
/// * `names` - Binary names of the bootstrap types
/// * `resources` - Where to read them from
///
/// # Returns
/// Image bytes by binary name, or the first missing or unreadable resource
pub(crate) fn read_bootstrap_images(
    names: &[String],
    resources: Option<&dyn ResourceLocator>,
) -> BridgeResult<FxHashMap<String, Arc<[u8]>>> {
    let mut images = FxHashMap::default();
    for name in names {
        let path = resource_path(name);
        let missing = || BridgeError::BootstrapMissing {
            name: name.clone(),
            path: path.clone(),
        };

        let Some(resources) = resources else {
            log::error!("Could not find required bootstrap type '{}': no resource locator", name);
            return Err(missing());
        };

        match resources.read(&path) {
            Ok(bytes) => {
                log::debug!("Read bootstrap image {} ({} bytes)", path.display(), bytes.len());
                images.insert(name.clone(), bytes.into());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::error!(
                    "Could not find required bootstrap type '{}' at {}",
                    name,
                    path.display()
                );
                return Err(missing());
            }
            Err(err) => {
                log::error!("Error reading image bytes for {}: {}", name, err);
                return Err(err.into());
            }
        }
    }
    Ok(images)
}
