mod atomic_io;
mod blob_store;
mod document;
mod save_system;

pub use blob_store::{BlobStore, BlobStoreError, FileBlobStore, MemoryBlobStore};
pub use document::{DocumentError, FavoriteEntry, PropertyDocument, DOCUMENT_VERSION};
pub use save_system::{LoadOutcome, SaveError, SaveOptions, SaveSystem, COMMAND_HISTORY_KEY};
