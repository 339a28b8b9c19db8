use crate::{
    errors::AppError,
    storage::{
        object_store::ObjectStore,
        resolver::{content_type_for, extension_of, validate_filename, UPLOADS_PREFIX},
    },
};
use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use log::{debug, error, info};
use rand::{distr::Alphanumeric, Rng};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const SUFFIX_LEN: usize = 8;
const MAX_STEM_LEN: usize = 40;

/// Extension allowlist applied to an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedTypes {
    /// PDF and Word documents.
    Manuscript,
    /// PDF only.
    Pdf,
    /// Word only.
    Word,
    /// Manuscripts plus cover/banner images.
    Document,
}

impl AllowedTypes {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            AllowedTypes::Manuscript => &["pdf", "doc", "docx"],
            AllowedTypes::Pdf => &["pdf"],
            AllowedTypes::Word => &["doc", "docx"],
            AllowedTypes::Document => &["pdf", "doc", "docx", "png", "jpg", "jpeg"],
        }
    }

    pub fn allows(&self, extension: &str) -> bool {
        self.extensions().contains(&extension)
    }
}

/// What the caller stores on the article.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    /// `/uploads/<name>` for local disk, an absolute URL for the object store.
    pub reference: String,
    pub filename: String,
    pub content_type: &'static str,
    pub size: u64,
}

/// Extension implied by a declared MIME type, used when the original name has none.
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "application/pdf" => Some("pdf"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        _ => None,
    }
}

fn sanitize_stem(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut out = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let truncated: String = out.trim_matches('-').chars().take(MAX_STEM_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Picks the extension to store under, enforcing the allowlist.
pub fn storage_extension(
    original_name: &str,
    declared_type: Option<&str>,
    allowed: AllowedTypes,
) -> Result<String, AppError> {
    let from_name = extension_of(original_name)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    let extension =
        from_name.or_else(|| declared_type.and_then(extension_for_mime).map(String::from));

    match extension {
        Some(ext) if allowed.allows(&ext) => Ok(ext),
        Some(ext) => Err(AppError::InvalidContentType(format!(
            "Files of type .{} are not accepted (allowed: {})",
            ext,
            allowed.extensions().join(", ")
        ))),
        None => Err(AppError::InvalidContentType(format!(
            "Could not determine the file type of '{}' (allowed: {})",
            original_name,
            allowed.extensions().join(", ")
        ))),
    }
}

/// Collision-resistant storage name: millisecond timestamp, random suffix,
/// sanitized original stem, extension. Always matches the resolver alphabet.
pub fn generate_stored_name(original_name: &str, extension: &str, now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    let stem = sanitize_stem(original_name);
    if stem.is_empty() {
        format!("{}-{}.{}", now.timestamp_millis(), suffix, extension)
    } else {
        format!("{}-{}-{}.{}", now.timestamp_millis(), suffix, stem, extension)
    }
}

/// Writes uploads into the single canonical uploads directory.
#[derive(Debug, Clone)]
pub struct LocalDiskStore {
    dir: PathBuf,
}

impl LocalDiskStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        if !self.dir.exists() {
            info!("Creating uploads directory {:?}...", self.dir);
            std::fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    async fn write<S, E>(
        &self,
        filename: &str,
        mut stream: S,
        max_bytes: u64,
    ) -> Result<u64, AppError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let storage_err = |op: &str, e: &dyn Display| {
            AppError::StorageUnavailable(format!("local disk {} {:?}: {}", op, self.dir, e))
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_err("create dir", &e))?;
        let path = self.dir.join(filename);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| storage_err("create", &e))?;

        let mut written: u64 = 0;
        let outcome: Result<(), AppError> = async {
            while let Some(chunk) = stream.next().await {
                let data = chunk.map_err(|e| {
                    AppError::invalid("file", format!("Upload stream failed: {}", e))
                })?;
                written += data.len() as u64;
                if written > max_bytes {
                    return Err(too_large(max_bytes));
                }
                file.write_all(&data)
                    .await
                    .map_err(|e| storage_err("write", &e))?;
            }
            file.flush().await.map_err(|e| storage_err("flush", &e))?;
            file.sync_all().await.map_err(|e| storage_err("sync", &e))
        }
        .await;

        if let Err(e) = outcome {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                error!("Failed to remove partial upload {:?}: {}", path, remove_err);
            }
            return Err(e);
        }
        Ok(written)
    }
}

fn too_large(max_bytes: u64) -> AppError {
    AppError::PayloadTooLarge(format!(
        "Uploaded file exceeds the {} byte limit",
        max_bytes
    ))
}

/// Storage backend chosen per deployment.
#[derive(Clone)]
pub enum UploadStore {
    LocalDisk(LocalDiskStore),
    ObjectStore(ObjectStore),
}

impl UploadStore {
    pub fn name(&self) -> &'static str {
        match self {
            UploadStore::LocalDisk(_) => "local disk",
            UploadStore::ObjectStore(_) => "object store",
        }
    }
}

/// Accepts incoming files, renames them and persists them to the configured backend.
#[derive(Clone)]
pub struct Ingestor {
    store: UploadStore,
    max_bytes: u64,
}

impl Ingestor {
    pub fn new(store: UploadStore, max_bytes: u64) -> Self {
        Self { store, max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// Streams one file into storage. The caller-supplied name only
    /// contributes a sanitized stem and the extension; it is never used as
    /// the storage key.
    pub async fn ingest<S, E>(
        &self,
        original_name: &str,
        declared_type: Option<&str>,
        allowed: AllowedTypes,
        mut stream: S,
    ) -> Result<StoredUpload, AppError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let extension = storage_extension(original_name, declared_type, allowed)?;
        let filename = generate_stored_name(original_name, &extension, Utc::now());
        let content_type = content_type_for(&filename);
        debug!(
            "Ingesting '{}' (declared {:?}) as {} via {}",
            original_name,
            declared_type,
            filename,
            self.store.name()
        );

        let (reference, size) = match &self.store {
            UploadStore::LocalDisk(disk) => {
                let size = disk.write(&filename, stream, self.max_bytes).await?;
                (format!("{}{}", UPLOADS_PREFIX, filename), size)
            }
            UploadStore::ObjectStore(store) => {
                let mut buffer = Vec::new();
                while let Some(chunk) = stream.next().await {
                    let data = chunk.map_err(|e| {
                        AppError::invalid("file", format!("Upload stream failed: {}", e))
                    })?;
                    if (buffer.len() + data.len()) as u64 > self.max_bytes {
                        return Err(too_large(self.max_bytes));
                    }
                    buffer.extend_from_slice(&data);
                }
                let size = buffer.len() as u64;
                let url = store.put(&store.key_for(&filename), buffer, content_type).await?;
                (url, size)
            }
        };

        info!("Stored upload '{}' as {} ({} bytes)", original_name, reference, size);
        Ok(StoredUpload {
            reference,
            filename,
            content_type,
            size,
        })
    }

    /// References of everything currently held by the backend, sorted.
    pub async fn list(&self) -> Result<Vec<String>, AppError> {
        let mut references = match &self.store {
            UploadStore::LocalDisk(disk) => {
                let mut entries = match tokio::fs::read_dir(disk.dir()).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => {
                        return Err(AppError::StorageUnavailable(format!(
                            "local disk list {:?}: {}",
                            disk.dir(),
                            e
                        )))
                    }
                };
                let mut references = Vec::new();
                while let Some(entry) = entries.next_entry().await.map_err(|e| {
                    AppError::StorageUnavailable(format!("local disk list {:?}: {}", disk.dir(), e))
                })? {
                    if let Some(name) = entry.file_name().to_str() {
                        if validate_filename(name).is_ok() && entry.path().is_file() {
                            references.push(format!("{}{}", UPLOADS_PREFIX, name));
                        }
                    }
                }
                references
            }
            UploadStore::ObjectStore(store) => store
                .list()
                .await?
                .iter()
                .map(|key| store.url_for(key))
                .collect(),
        };
        references.sort();
        Ok(references)
    }
}
