use std::time::Duration;

use actix_web::{
    body::MessageBody,
    cookie::{Cookie, Key},
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware, web, App, Error,
};
use chrono::Utc;
use journal_platform::{
    config::{Config, StorageConfig},
    db::{journal_repository::JournalRepository, user_repository::UserRepository},
    models::journal::NewJournal,
    routes::files::serve_static_uploads,
    AppState,
};
use tempfile::{tempdir, TempDir};

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct horse battery";

pub struct TestEnv {
    pub dir: TempDir,
    pub state: web::Data<AppState>,
    pub key: Key,
    pub journal_id: i64,
}

/// Fresh database and upload directory with one journal and one super-admin.
pub fn test_env() -> TestEnv {
    let dir = tempdir().expect("tempdir");
    let upload_dir = dir.path().join("uploads");
    std::fs::create_dir_all(&upload_dir).expect("upload dir");

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: dir.path().join("journal.db"),
        upload_dir: upload_dir.clone(),
        upload_search_paths: vec![upload_dir],
        max_upload_bytes: 1024 * 1024,
        storage: StorageConfig::LocalDisk,
        session_secret: None,
        admin_username: None,
        admin_password: None,
        request_timeout: Duration::from_secs(30),
        keep_alive: Duration::from_secs(65),
    };
    let state = AppState::new(config);
    state.db.init().expect("schema");

    let hash = bcrypt::hash(ADMIN_PASSWORD, 4).expect("hash");
    UserRepository::new(state.db.connect().expect("connect"))
        .create(ADMIN_USER, &hash, None, None, Utc::now())
        .expect("seed admin");
    let journal = JournalRepository::new(state.db.connect().expect("connect"))
        .create(
            &NewJournal {
                title: "Journal of Tests".to_string(),
                issn: "1234-5678".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .expect("seed journal");

    TestEnv {
        dir,
        state: web::Data::new(state),
        key: Key::generate(),
        journal_id: journal.id,
    }
}

pub fn app(
    env: &TestEnv,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = Error,
    >,
> {
    let state = env.state.clone();
    App::new()
        .wrap(middleware::from_fn(serve_static_uploads))
        .wrap(journal_platform::session_middleware(env.key.clone()))
        .configure(|cfg| journal_platform::configure(cfg, state))
}

/// Pulls the session cookie out of a login response.
pub fn session_cookie<B>(resp: &ServiceResponse<B>) -> Cookie<'static> {
    resp.response()
        .cookies()
        .find(|c| c.name() == journal_platform::SESSION_COOKIE_NAME)
        .expect("session cookie")
        .into_owned()
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        body: &'a [u8],
    },
}

pub const BOUNDARY: &str = "----journal-test-boundary";

/// Builds a `multipart/form-data` body and its content-type header value.
pub fn multipart(parts: &[Part]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                body: bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
