use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Key, error, web};

use crate::{
    config::{Config, StorageConfig},
    db::Database,
    errors::AppError,
    storage::{FileResolver, Ingestor, LocalDiskStore, ObjectStore, UploadStore},
};

pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod storage;
pub mod utils;

pub const SESSION_COOKIE_NAME: &str = "journal-session";

/// Everything a handler needs, built once from `Config` at startup.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub resolver: FileResolver,
    pub ingestor: Ingestor,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = match &config.storage {
            StorageConfig::LocalDisk => {
                UploadStore::LocalDisk(LocalDiskStore::new(config.upload_dir.clone()))
            }
            StorageConfig::ObjectStore(s3) => UploadStore::ObjectStore(ObjectStore::new(s3)),
        };
        Self {
            db: Database::new(config.database_path.clone()),
            resolver: FileResolver::new(config.upload_search_paths.clone()),
            ingestor: Ingestor::new(store, config.max_upload_bytes),
            config,
        }
    }
}

pub fn session_middleware(key: Key) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_secure(false)
        .cookie_path("/".to_string())
        .cookie_name(SESSION_COOKIE_NAME.to_string())
        .cookie_http_only(true)
        .cookie_same_site(actix_web::cookie::SameSite::Lax)
        .build()
}

/// Registers every route plus shared state and extractor limits. Extractor
/// failures use the same JSON error body as everything else.
pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<AppState>) {
    let json_limit = usize::try_from(state.config.max_upload_bytes).unwrap_or(usize::MAX);

    cfg.app_data(state)
        .app_data(
            web::JsonConfig::default()
                .limit(json_limit)
                .error_handler(|err, _req| match err {
                    error::JsonPayloadError::OverflowKnownLength { .. }
                    | error::JsonPayloadError::Overflow { .. } => {
                        AppError::PayloadTooLarge(err.to_string()).into()
                    }
                    other => AppError::invalid("body", other.to_string()).into(),
                }),
        )
        .app_data(
            web::QueryConfig::default()
                .error_handler(|err, _req| AppError::invalid("query", err.to_string()).into()),
        )
        .app_data(
            web::PathConfig::default()
                .error_handler(|err, _req| AppError::invalid("path", err.to_string()).into()),
        )
        // Files
        .service(routes::files::download_upload)
        // Public API
        .service(routes::journals::list_journals)
        .service(routes::journals::journal_by_issn)
        .service(routes::journals::journal_by_shortcode)
        .service(routes::journals::journal_by_id)
        .service(routes::journals::articles_in_press)
        .service(routes::journals::current_issue)
        .service(routes::journals::archive)
        .service(routes::articles::list_articles)
        .service(routes::articles::article_by_id)
        .service(routes::articles::related_articles)
        .service(routes::submissions::submit_manuscript)
        // Admin
        .service(
            web::scope("/admin")
                .service(routes::auth::login)
                .service(routes::auth::logout)
                .service(routes::auth::me)
                .service(routes::admin::dashboard)
                .service(routes::admin::list_articles)
                .service(routes::admin::create_article)
                .service(routes::admin::get_article)
                .service(routes::admin::update_article)
                .service(routes::admin::delete_article)
                .service(routes::admin::transition_article)
                .service(routes::admin::replace_article_files)
                .service(routes::admin::upload_file)
                .service(routes::admin::list_uploads)
                .service(routes::admin::create_journal)
                .service(routes::admin::update_journal)
                .service(routes::admin::delete_journal)
                .service(routes::admin::list_shortcodes)
                .service(routes::admin::create_shortcode)
                .service(routes::admin::delete_shortcode)
                .service(routes::admin::create_user),
        );
}
