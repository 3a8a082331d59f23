use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use ash::prelude::VkResult;

use crate::{device::PipelineDevice, Result};

#[derive(Debug, Clone)]
pub struct PipelineCacheConfig {
    /// Where the durable library is loaded from and saved to. `None` keeps it in memory only.
    pub path: Option<PathBuf>,
    /// Disables the durable library entirely when false.
    pub enabled: bool,
}
impl Default for PipelineCacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    /// Served from the in-memory map.
    pub hits: u64,
    /// Loaded from the durable library.
    pub library_hits: u64,
    /// Built from scratch by the device.
    pub misses: u64,
    /// Pipelines currently held in memory.
    pub total: usize,
}

struct CacheState<D: PipelineDevice> {
    pipelines: HashMap<String, Arc<D::Pipeline>>,
    library: Option<D::Library>,
    /// The library gained entries since the last save.
    dirty: bool,
}

/// Name-keyed cache of compiled pipeline objects.
///
/// Lookups go to the in-memory map first, then the durable library, and only then to
/// the device. Builds happen while holding the cache lock so that racing requests for
/// one name never build it twice.
pub struct PipelineObjectCache<D: PipelineDevice> {
    device: Arc<D>,
    config: PipelineCacheConfig,
    state: Mutex<CacheState<D>>,
    hits: AtomicU64,
    library_hits: AtomicU64,
    misses: AtomicU64,
}

impl<D: PipelineDevice> PipelineObjectCache<D> {
    pub fn new(device: Arc<D>, config: PipelineCacheConfig) -> Self {
        let library = if config.enabled {
            Self::load_library(&device, config.path.as_deref())
        } else {
            None
        };
        Self {
            device,
            config,
            state: Mutex::new(CacheState {
                pipelines: HashMap::new(),
                library,
                dirty: false,
            }),
            hits: AtomicU64::new(0),
            library_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Never fails: a missing, unreadable or rejected blob degrades to an empty library,
    /// and a device without library support degrades to no library.
    fn load_library(device: &D, path: Option<&Path>) -> Option<D::Library> {
        let initial_data = path.and_then(|path| match std::fs::read(path) {
            Ok(data) => {
                tracing::info!(path = %path.display(), bytes = data.len(), "pipeline library loaded");
                Some(data)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no pipeline library on disk");
                None
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to read pipeline library");
                None
            }
        });
        match device.create_library(initial_data.as_deref()) {
            Ok(library) => return Some(library),
            Err(err) if initial_data.is_some() => {
                tracing::warn!(%err, "pipeline library rejected by the device, starting empty");
            }
            Err(err) => {
                tracing::warn!(%err, "failed to create pipeline library");
                return None;
            }
        }
        device
            .create_library(None)
            .map_err(|err| tracing::warn!(%err, "failed to create empty pipeline library"))
            .ok()
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }
    pub fn has_library(&self) -> bool {
        self.state.lock().unwrap().library.is_some()
    }

    pub fn get_or_create_graphics(
        &self,
        name: &str,
        desc: &D::GraphicsDesc,
    ) -> Result<Arc<D::Pipeline>> {
        self.get_or_create(name, |library| self.device.build_graphics(desc, library))
    }

    pub fn get_or_create_compute(
        &self,
        name: &str,
        desc: &D::ComputeDesc,
    ) -> Result<Arc<D::Pipeline>> {
        self.get_or_create(name, |library| self.device.build_compute(desc, library))
    }

    fn get_or_create(
        &self,
        name: &str,
        build: impl FnOnce(Option<&D::Library>) -> VkResult<D::Pipeline>,
    ) -> Result<Arc<D::Pipeline>> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if let Some(pipeline) = state.pipelines.get(name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(pipeline.clone());
        }
        if let Some(library) = state.library.as_ref() {
            if let Some(pipeline) = self.device.load_pipeline(library, name) {
                self.library_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(name, "pipeline loaded from library");
                let pipeline = Arc::new(pipeline);
                state.pipelines.insert(name.to_owned(), pipeline.clone());
                return Ok(pipeline);
            }
        }

        let pipeline = build(state.library.as_ref()).map_err(|err| {
            tracing::error!(name, %err, "pipeline build failed");
            err
        })?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(name, "pipeline built");
        if let Some(library) = state.library.as_mut() {
            match self.device.store_pipeline(library, name, &pipeline) {
                Ok(()) => state.dirty = true,
                Err(err) => tracing::warn!(name, %err, "failed to store pipeline in library"),
            }
        }
        let pipeline = Arc::new(pipeline);
        state.pipelines.insert(name.to_owned(), pipeline.clone());
        Ok(pipeline)
    }

    /// Serializes the durable library and writes it to the configured path.
    ///
    /// Returns whether anything was written. Failures are logged and only cost a
    /// rebuild on the next cold start.
    pub fn save_to_disk(&self) -> bool {
        let Some(path) = self.config.path.as_deref() else {
            return false;
        };
        let mut state = self.state.lock().unwrap();
        if !state.dirty {
            return false;
        }
        let Some(library) = state.library.as_ref() else {
            return false;
        };
        let data = match self.device.serialize_library(library) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(%err, "failed to serialize pipeline library");
                return false;
            }
        };
        if let Err(err) = write_file(path, &data) {
            tracing::warn!(path = %path.display(), %err, "failed to save pipeline library");
            return false;
        }
        state.dirty = false;
        tracing::info!(path = %path.display(), bytes = data.len(), "pipeline library saved");
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().pipelines.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Drops every in-memory pipeline. The durable library is kept.
    pub fn clear(&self) {
        self.state.lock().unwrap().pipelines.clear();
    }

    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            library_hits: self.library_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            total: self.len(),
        }
    }
}

/// `pipelines.bin` stages through `pipelines.bin.partial`.
fn staging_path(path: &Path) -> Option<PathBuf> {
    let mut name = path.file_name()?.to_os_string();
    name.push(".partial");
    Some(path.with_file_name(name))
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let staging = staging_path(path).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    // Write then rename, so a crash never leaves a truncated blob behind.
    std::fs::write(&staging, data)?;
    std::fs::rename(&staging, path)
}
