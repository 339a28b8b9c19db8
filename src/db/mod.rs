pub mod article_repository;
pub mod journal_repository;
pub mod schema;
pub mod shortcode_repository;
pub mod user_repository;

pub use schema::Database;

use rusqlite::{ffi, ErrorCode};

/// True when an insert or update tripped a UNIQUE index.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
