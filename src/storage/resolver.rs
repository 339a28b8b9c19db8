use crate::errors::AppError;
use log::{debug, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Logical namespace local references live under.
pub const UPLOADS_PREFIX: &str = "/uploads/";

static FILENAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("filename pattern compiles"));

const MAX_FILENAME_LEN: usize = 255;

/// Checks a bare stored filename before any filesystem access.
///
/// Only `[A-Za-z0-9._-]` is allowed, which rules out separators and
/// encoded traversal. Names made only of dots are refused as well since
/// `..` would otherwise pass the character check.
pub fn validate_filename(name: &str) -> Result<&str, AppError> {
    if name.is_empty()
        || name.len() > MAX_FILENAME_LEN
        || !FILENAME_PATTERN.is_match(name)
        || name.chars().all(|c| c == '.')
    {
        return Err(AppError::InvalidReference(name.to_string()));
    }
    Ok(name)
}

/// Extension (lowercased) of a stored filename, if any.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Fixed extension to MIME map shared by every place that serves files.
pub fn content_type_for(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// How a persisted `pdfUrl`/`wordUrl` value should be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReference<'a> {
    /// `/uploads/<filename>`, resolved against the local search roots.
    Local(&'a str),
    /// Absolute object-store or CDN URL, fetched directly by the consumer.
    Remote(&'a str),
}

impl<'a> FileReference<'a> {
    pub fn parse(reference: &'a str) -> Result<Self, AppError> {
        let trimmed = reference.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(FileReference::Remote(trimmed));
        }
        match trimmed.strip_prefix(UPLOADS_PREFIX) {
            Some(name) => Ok(FileReference::Local(validate_filename(name)?)),
            None => Err(AppError::InvalidReference(reference.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: &'static str,
}

/// Finds stored uploads across the directory layouts a deployment may use.
///
/// Container filesystems are not stable across restarts, so the same file
/// may sit under the configured upload directory, a compiled output tree
/// or a `backend/` subfolder. Roots are probed in order; first hit wins.
#[derive(Debug, Clone)]
pub struct FileResolver {
    roots: Vec<PathBuf>,
}

impl FileResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn resolve(&self, filename: &str) -> Result<ResolvedFile, AppError> {
        let filename = validate_filename(filename)?;

        for root in &self.roots {
            let candidate = root.join(filename);
            let found = candidate.is_file();
            debug!(
                "Checking upload candidate {:?}: {}",
                candidate,
                if found { "found" } else { "missing" }
            );
            if found {
                return Ok(ResolvedFile {
                    path: candidate,
                    filename: filename.to_string(),
                    content_type: content_type_for(filename),
                });
            }
        }

        warn!(
            "Upload {} not found in {} search path(s)",
            filename,
            self.roots.len()
        );
        Err(AppError::NotFound(format!(
            "File {} not found in any upload directory; local storage may be ephemeral and \
             files uploaded before the last redeploy are expected to be missing",
            filename
        )))
    }

    /// Resolves a stored reference. Remote URLs are handed back untouched.
    pub fn resolve_reference(&self, reference: &str) -> Result<Located, AppError> {
        match FileReference::parse(reference)? {
            FileReference::Local(name) => self.resolve(name).map(Located::Local),
            FileReference::Remote(url) => Ok(Located::Remote(url.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    Local(ResolvedFile),
    Remote(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rejects_anything_outside_the_safe_alphabet() {
        for name in [
            "../../etc/passwd",
            "..",
            ".",
            "a/b.pdf",
            "a\\b.pdf",
            "report(final).pdf",
            "name with space.pdf",
            "%2e%2e%2fetc",
            "",
            "naïve.pdf",
        ] {
            assert!(
                matches!(validate_filename(name), Err(AppError::InvalidReference(_))),
                "{:?} should be rejected",
                name
            );
        }
        assert!(validate_filename("1700000000000-a1B2c3D4-report-final.pdf").is_ok());
        assert!(validate_filename(".hidden").is_ok());
    }

    #[test]
    fn invalid_names_never_reach_the_filesystem() {
        // A root that would fail loudly if it were ever probed.
        let resolver = FileResolver::new(vec![PathBuf::from("/definitely/not/here")]);
        assert!(matches!(
            resolver.resolve("../../etc/passwd"),
            Err(AppError::InvalidReference(_))
        ));
    }

    #[test]
    fn content_types_follow_the_extension_map() {
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("a.PDF"), "application/pdf");
        assert_eq!(content_type_for("a.doc"), "application/msword");
        assert_eq!(
            content_type_for("a.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.exe"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn first_root_containing_the_file_wins() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        fs::write(second.path().join("paper.pdf"), b"second").unwrap();

        let resolver = FileResolver::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        let resolved = resolver.resolve("paper.pdf").unwrap();
        assert_eq!(resolved.path, second.path().join("paper.pdf"));
        assert_eq!(resolved.content_type, "application/pdf");

        fs::write(first.path().join("paper.pdf"), b"first").unwrap();
        let resolved = resolver.resolve("paper.pdf").unwrap();
        assert_eq!(resolved.path, first.path().join("paper.pdf"));
    }

    #[test]
    fn missing_file_mentions_ephemeral_storage() {
        let root = tempdir().unwrap();
        let resolver = FileResolver::new(vec![root.path().to_path_buf()]);
        match resolver.resolve("gone.pdf") {
            Err(AppError::NotFound(msg)) => assert!(msg.contains("ephemeral")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn directories_are_not_files() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("nested")).unwrap();
        let resolver = FileResolver::new(vec![root.path().to_path_buf()]);
        assert!(matches!(
            resolver.resolve("nested"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn references_split_into_local_and_remote() {
        assert_eq!(
            FileReference::parse("/uploads/a.pdf").unwrap(),
            FileReference::Local("a.pdf")
        );
        assert_eq!(
            FileReference::parse("https://cdn.example.org/uploads/a.pdf").unwrap(),
            FileReference::Remote("https://cdn.example.org/uploads/a.pdf")
        );
        assert!(FileReference::parse("/uploads/../secret").is_err());
        assert!(FileReference::parse("/etc/passwd").is_err());
    }
}
