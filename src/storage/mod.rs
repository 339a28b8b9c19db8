//! File storage: resolving stored references to bytes on disk, and
//! ingesting new uploads into the configured backend.

pub mod ingest;
pub mod object_store;
pub mod resolver;

pub use ingest::{AllowedTypes, Ingestor, LocalDiskStore, StoredUpload, UploadStore};
pub use object_store::ObjectStore;
pub use resolver::{
    content_type_for, validate_filename, FileResolver, Located, ResolvedFile, UPLOADS_PREFIX,
};
