//! Execution context provisioning.
//!
//! The engine image is loaded once and shared by every job. Provisioning
//! turns the raw image into a reference-counted [`ExecutionContext`]; each
//! job payload holds its own reference, so releasing the context only
//! affects jobs submitted afterwards.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Raw engine image, as produced by the engine build.
#[derive(Clone)]
pub struct EngineImage {
    bytes: Arc<[u8]>,
    version: String,
}

impl EngineImage {
    /// Wrap an image already in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, version: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            version: version.into(),
        }
    }

    /// Read the image from a shared library on disk.
    pub fn load(path: impl AsRef<Path>, version: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read engine image '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::from_bytes(bytes, version))
    }

    /// An empty image, for launchers that do not load the engine from bytes.
    pub fn empty() -> Self {
        Self::from_bytes(Vec::new(), crate::ENGINE_VERSION)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Debug for EngineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineImage")
            .field("len", &self.bytes.len())
            .field("version", &self.version)
            .finish()
    }
}

/// A provisioned, shareable engine image.
///
/// Read-only once created; safe to hand to any number of concurrent workers.
#[derive(Clone)]
pub struct ExecutionContext {
    image: Arc<[u8]>,
    version: Arc<str>,
}

impl ExecutionContext {
    fn package(raw: &EngineImage) -> Self {
        Self {
            image: Arc::from(&raw.bytes[..]),
            version: Arc::from(raw.version.as_str()),
        }
    }

    /// The engine image bytes.
    pub fn image(&self) -> Arc<[u8]> {
        Arc::clone(&self.image)
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("len", &self.image.len())
            .field("version", &self.version)
            .finish()
    }
}

/// Lazily provisions and caches the [`ExecutionContext`].
#[derive(Debug)]
pub struct ContextProvisioner {
    raw: EngineImage,
    context: Option<ExecutionContext>,
}

impl ContextProvisioner {
    pub fn new(raw: EngineImage) -> Self {
        Self { raw, context: None }
    }

    /// Provision the context if needed and return it.
    pub fn ensure(&mut self) -> &ExecutionContext {
        let raw = &self.raw;
        self.context.get_or_insert_with(|| {
            tracing::info!(
                "Provisioned execution context ({} bytes, engine {})",
                raw.len(),
                raw.version()
            );
            ExecutionContext::package(raw)
        })
    }

    /// Drop the cached context. No-op if never provisioned.
    pub fn release(&mut self) {
        if self.context.take().is_some() {
            tracing::info!("Released execution context");
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.context.is_some()
    }
}
