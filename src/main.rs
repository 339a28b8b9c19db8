use actix_web::{middleware, web, App, HttpServer};
use chrono::Utc;
use dotenv::dotenv;
use env_logger::Env;
use log::{error, info, warn};

use journal_platform::{
    config::{Config, StorageConfig},
    db::{user_repository::UserRepository, Database},
    errors::AppError,
    routes::files::serve_static_uploads,
    storage::LocalDiskStore,
    utils::security::hash_password,
    AppState,
};

async fn seed_admin_user(config: &Config, db: &Database) -> Result<(), AppError> {
    let (Some(user_name), Some(password)) = (
        config.admin_username.clone(),
        config.admin_password.clone(),
    ) else {
        info!("ADMIN_USERNAME/ADMIN_PASSWORD not set, skipping admin seed");
        return Ok(());
    };

    let db = db.clone();
    web::block(move || {
        let repo = UserRepository::new(db.connect()?);
        if repo.find_by_user_name(&user_name)?.is_some() {
            info!("Admin user {} already exists", user_name);
            return Ok(());
        }
        info!("Admin user not found, creating {}", user_name);
        let password_hash = hash_password(&password)?;
        repo.create(&user_name, &password_hash, None, None, Utc::now())?;
        info!("Admin user {} created", user_name);
        Ok(())
    })
    .await?
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Worker panics are logged; actix keeps serving on the remaining workers.
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Unhandled panic: {}", panic_info);
    }));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let secret_key = match config.session_key() {
        Ok(key) => key,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let db = Database::new(config.database_path.clone());
    if let Err(e) = db.init() {
        error!("Failed to initialise database {:?}: {}", db.path(), e);
        std::process::exit(1);
    }

    match &config.storage {
        StorageConfig::LocalDisk => {
            if let Err(e) = LocalDiskStore::new(config.upload_dir.clone()).ensure_dir() {
                warn!("Failed to create uploads directory {:?}: {}", config.upload_dir, e);
            }
        }
        StorageConfig::ObjectStore(s3) => info!("Uploads go to object storage bucket {}", s3.bucket),
    }

    if let Err(e) = seed_admin_user(&config, &db).await {
        error!("Failed to seed admin user: {}", e);
    }

    let host = config.host.clone();
    let port = config.port;
    let request_timeout = config.request_timeout;
    let keep_alive = config.keep_alive;
    let state = web::Data::new(AppState::new(config));
    info!(
        "Uploads stored on {} (limit {} bytes)",
        state.ingestor.store().name(),
        state.ingestor.max_bytes()
    );
    info!("Upload search paths: {:?}", state.resolver.roots());

    info!("Starting server on http://{}:{}...", host, port);

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(middleware::from_fn(serve_static_uploads))
            .wrap(journal_platform::session_middleware(secret_key.clone()))
            .wrap(middleware::Logger::default())
            .configure(|cfg| journal_platform::configure(cfg, state))
    })
    .client_request_timeout(request_timeout)
    .keep_alive(keep_alive)
    .bind((host.as_str(), port))?
    .run()
    .await
}
