use crate::errors::AppError;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where ingested files end up.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    LocalDisk,
    ObjectStore(ObjectStoreConfig),
}

#[derive(Clone, PartialEq)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// S3-compatible endpoint; switches the client to path-style addressing.
    pub endpoint: Option<String>,
    pub key_prefix: String,
    pub cdn_base_url: Option<String>,
}

// Keeps the secret out of debug logs.
impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("key_prefix", &self.key_prefix)
            .field("cdn_base_url", &self.cdn_base_url)
            .finish_non_exhaustive()
    }
}

/// Process-wide settings, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Canonical directory local ingestion writes to.
    pub upload_dir: PathBuf,
    /// Ordered roots the resolver probes when serving `/uploads/<name>`.
    pub upload_search_paths: Vec<PathBuf>,
    pub max_upload_bytes: u64,
    pub storage: StorageConfig,
    pub session_secret: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub request_timeout: Duration,
    pub keep_alive: Duration,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

impl Config {
    /// Builds the configuration from process environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("PORT must be a valid number, got '{}'", raw)))?,
            None => 8080,
        };

        let upload_dir = PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| "./data/uploads".into()));

        let upload_search_paths = match get("UPLOAD_SEARCH_PATHS") {
            Some(raw) => dedup_paths(env::split_paths(&raw)),
            None => {
                let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                default_search_paths(&upload_dir, &cwd)
            }
        };

        let max_upload_bytes = parse_number(get("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let storage = match get("STORAGE_BACKEND").as_deref().map(str::to_ascii_lowercase) {
            None => StorageConfig::LocalDisk,
            Some(backend) if backend == "local" => StorageConfig::LocalDisk,
            Some(backend) if backend == "s3" => {
                let required = |key: &str| {
                    get(key).ok_or_else(|| {
                        AppError::Config(format!("{} must be set when STORAGE_BACKEND=s3", key))
                    })
                };
                StorageConfig::ObjectStore(ObjectStoreConfig {
                    bucket: required("S3_BUCKET")?,
                    region: get("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                    access_key_id: required("S3_ACCESS_KEY_ID")?,
                    secret_access_key: required("S3_SECRET_ACCESS_KEY")?,
                    endpoint: get("S3_ENDPOINT"),
                    key_prefix: get("S3_KEY_PREFIX")
                        .unwrap_or_else(|| "uploads".into())
                        .trim_matches('/')
                        .to_string(),
                    cdn_base_url: get("CDN_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
                })
            }
            Some(other) => {
                return Err(AppError::Config(format!(
                    "STORAGE_BACKEND must be 'local' or 's3', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_path: PathBuf::from(
                get("DATABASE_PATH").unwrap_or_else(|| "./data/journal_platform.db".into()),
            ),
            upload_dir,
            upload_search_paths,
            max_upload_bytes,
            storage,
            session_secret: get("SESSION_SECRET_KEY"),
            admin_username: get("ADMIN_USERNAME"),
            admin_password: get("ADMIN_PASSWORD"),
            request_timeout: Duration::from_secs(
                parse_number(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            keep_alive: Duration::from_secs(
                parse_number(get("KEEP_ALIVE_SECS"), "KEEP_ALIVE_SECS")?.unwrap_or(65),
            ),
        })
    }

    /// Cookie signing key; actix requires at least 64 bytes.
    pub fn session_key(&self) -> Result<actix_web::cookie::Key, AppError> {
        let secret = self
            .session_secret
            .as_deref()
            .ok_or_else(|| AppError::Config("SESSION_SECRET_KEY must be set".into()))?;
        actix_web::cookie::Key::try_from(secret.as_bytes()).map_err(|_| {
            AppError::Config("SESSION_SECRET_KEY must be at least 64 bytes long".into())
        })
    }
}

fn parse_number(raw: Option<String>, key: &str) -> Result<Option<u64>, AppError> {
    raw.map(|v| {
        v.trim()
            .parse::<u64>()
            .map_err(|_| AppError::Config(format!("{} must be a positive number, got '{}'", key, v)))
    })
    .transpose()
}

/// Layouts seen across deployments: the configured directory, the working
/// directory, a compiled `dist/` tree, a `backend/` subfolder and the
/// container root.
pub fn default_search_paths(upload_dir: &Path, cwd: &Path) -> Vec<PathBuf> {
    let absolute_upload_dir = if upload_dir.is_absolute() {
        upload_dir.to_path_buf()
    } else {
        cwd.join(upload_dir)
    };
    dedup_paths([
        absolute_upload_dir,
        cwd.join("uploads"),
        cwd.join("dist").join("uploads"),
        cwd.join("backend").join("uploads"),
        PathBuf::from("/app/uploads"),
    ])
}

fn dedup_paths(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for path in paths {
        if !path.as_os_str().is_empty() && !out.contains(&path) {
            out.push(path);
        }
    }
    out
}
