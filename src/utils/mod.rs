use actix_multipart::Field;
use actix_web::web;
use futures::StreamExt;
use log::{info, warn};
use rusqlite::Connection;

use crate::{
    db::Database,
    errors::AppError,
    storage::{AllowedTypes, FileResolver, Ingestor, Located, StoredUpload},
};

pub mod security;

/// Cap for plain text form fields (abstracts can carry HTML).
pub const MAX_TEXT_FIELD_BYTES: usize = 256 * 1024;

/// Runs blocking database work off the async workers on a fresh connection.
pub async fn run_db<F, T>(db: &Database, work: F) -> Result<T, AppError>
where
    F: FnOnce(Connection) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    web::block(move || {
        let conn = db.connect()?;
        work(conn)
    })
    .await?
}

/// Form name of a multipart part.
pub fn field_name(field: &Field) -> Result<String, AppError> {
    field
        .content_disposition()
        .and_then(|cd| cd.get_name())
        .map(str::to_string)
        .ok_or_else(|| AppError::invalid("form", "Multipart part without a field name"))
}

// Helper to read text fields from multipart
pub async fn read_field(mut field: Field) -> Result<String, AppError> {
    let name = field_name(&field).unwrap_or_default();
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| AppError::invalid(&name, format!("Chunk error: {}", e)))?;
        if bytes.len() + data.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::PayloadTooLarge(format!(
                "Field {} exceeds {} bytes",
                name, MAX_TEXT_FIELD_BYTES
            )));
        }
        bytes.extend_from_slice(&data);
    }
    String::from_utf8(bytes).map_err(|_| AppError::invalid(&name, "Field must be valid UTF-8"))
}

/// Drains a part we do not care about.
pub async fn skip_field(mut field: Field) {
    while field.next().await.is_some() {}
}

/// Streams a file part into storage. A part sent with an empty filename
/// (a file input left blank) is drained and yields `None`.
pub async fn ingest_field(
    ingestor: &Ingestor,
    field: Field,
    allowed: AllowedTypes,
) -> Result<Option<StoredUpload>, AppError> {
    let original_name = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    let Some(original_name) = original_name else {
        skip_field(field).await;
        return Ok(None);
    };
    let declared_type = field.content_type().map(|m| m.essence_str().to_string());

    ingestor
        .ingest(&original_name, declared_type.as_deref(), allowed, field)
        .await
        .map(Some)
}

/// Removes uploads stored during a request that ended up failing.
pub async fn discard_uploads(resolver: &FileResolver, references: &[String]) {
    for reference in references {
        remove_local_upload(resolver, reference).await;
    }
}

/// Best-effort removal of a locally stored upload that is no longer referenced.
pub async fn remove_local_upload(resolver: &FileResolver, reference: &str) {
    match resolver.resolve_reference(reference) {
        Ok(Located::Local(file)) => match tokio::fs::remove_file(&file.path).await {
            Ok(()) => info!("Removed upload {:?}", file.path),
            Err(e) => warn!("Failed to remove upload {:?}: {}", file.path, e),
        },
        Ok(Located::Remote(url)) => info!("Leaving remote object {} in place", url),
        Err(e) => warn!("Upload {} could not be located for removal: {}", reference, e),
    }
}

/// Normalizes an admin-supplied `pdfUrl`/`wordUrl`. Blank values clear the
/// field; anything else must be a stored upload or an http(s) URL.
pub fn check_file_reference(
    resolver: &FileResolver,
    field: &str,
    reference: &mut Option<String>,
) -> Result<(), AppError> {
    let Some(value) = reference.as_deref().map(|r| r.trim().to_string()) else {
        return Ok(());
    };
    if value.is_empty() {
        *reference = None;
        return Ok(());
    }
    resolver.resolve_reference(&value).map_err(|e| {
        warn!("Rejected {} reference {:?}: {}", field, value, e);
        AppError::invalid(
            field,
            "Must be an existing /uploads/ file or an http(s) URL",
        )
    })?;
    *reference = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_references_must_resolve() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("paper.pdf"), b"%PDF").unwrap();
        let resolver = FileResolver::new(vec![dir.path().to_path_buf()]);

        let mut stored = Some(" /uploads/paper.pdf ".to_string());
        check_file_reference(&resolver, "pdfUrl", &mut stored).unwrap();
        assert_eq!(stored.as_deref(), Some("/uploads/paper.pdf"));

        let mut remote = Some("https://cdn.example.org/paper.pdf".to_string());
        check_file_reference(&resolver, "pdfUrl", &mut remote).unwrap();

        let mut blank = Some("  ".to_string());
        check_file_reference(&resolver, "wordUrl", &mut blank).unwrap();
        assert_eq!(blank, None);

        for bad in [
            "../../etc/passwd",
            "javascript:alert(1)",
            "/uploads/../secret.pdf",
            "/uploads/missing.pdf",
        ] {
            let mut reference = Some(bad.to_string());
            let Err(AppError::Validation(errors)) =
                check_file_reference(&resolver, "wordUrl", &mut reference)
            else {
                panic!("{} should be rejected", bad);
            };
            assert_eq!(errors[0].field, "wordUrl");
        }
    }
}
