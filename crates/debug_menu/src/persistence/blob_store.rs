use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use super::atomic_io::write_text_atomic;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("slot name '{slot}' is not usable as a file name")]
    InvalidSlot { slot: String },
    #[error("failed to read/write file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Slot-addressed text storage.
pub trait BlobStore {
    fn save(&mut self, slot: &str, text: &str) -> Result<(), BlobStoreError>;

    /// `Ok(None)` when nothing has been saved under `slot`, or the slot was
    /// deleted.
    fn load(&self, slot: &str) -> Result<Option<String>, BlobStoreError>;

    fn delete(&mut self, slot: &str) -> Result<(), BlobStoreError>;
}

/// Stores each slot as `<dir>/<slot>.json`.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn slot_path(&self, slot: &str) -> Result<PathBuf, BlobStoreError> {
        let valid = !slot.is_empty()
            && slot != "."
            && slot != ".."
            && !slot.contains(&['/', '\\', ':'][..]);
        if !valid {
            return Err(BlobStoreError::InvalidSlot {
                slot: slot.to_string(),
            });
        }
        Ok(self.dir.join(format!("{slot}.json")))
    }
}

impl BlobStore for FileBlobStore {
    fn save(&mut self, slot: &str, text: &str) -> Result<(), BlobStoreError> {
        let path = self.slot_path(slot)?;
        write_text_atomic(&path, text).map_err(|source| BlobStoreError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = text.len(), "blob_saved");
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<String>, BlobStoreError> {
        let path = self.slot_path(slot)?;
        match fs::read_to_string(&path) {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => {
                debug!(path = %path.display(), bytes = text.len(), "blob_loaded");
                Ok(Some(text))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BlobStoreError::Io { path, source }),
        }
    }

    /// Truncates the slot to empty text; a missing file is already deleted.
    fn delete(&mut self, slot: &str) -> Result<(), BlobStoreError> {
        let path = self.slot_path(slot)?;
        if !path.exists() {
            return Ok(());
        }
        write_text_atomic(&path, "").map_err(|source| BlobStoreError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "blob_deleted");
        Ok(())
    }
}

/// Shared in-process store. Clones see the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    slots: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, slot: &str) -> Option<String> {
        self.slots.borrow().get(slot).cloned()
    }
}

impl BlobStore for MemoryBlobStore {
    fn save(&mut self, slot: &str, text: &str) -> Result<(), BlobStoreError> {
        self.slots
            .borrow_mut()
            .insert(slot.to_string(), text.to_string());
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<String>, BlobStoreError> {
        Ok(self.slots.borrow().get(slot).cloned())
    }

    fn delete(&mut self, slot: &str) -> Result<(), BlobStoreError> {
        self.slots.borrow_mut().remove(slot);
        Ok(())
    }
}
