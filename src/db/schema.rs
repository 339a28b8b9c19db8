use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the SQLite file. Each unit of work opens its own connection;
/// SQLite serialises writers and the busy timeout makes them queue.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Opens the file (creating parent directories) and applies the schema.
    pub fn init(&self) -> Result<(), rusqlite::Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    rusqlite::Error::InvalidPath(PathBuf::from(format!(
                        "{}: {}",
                        parent.display(),
                        e
                    )))
                })?;
            }
        }
        let conn = self.connect()?;
        init_db(&conn)
    }
}

pub fn init_db(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;

        CREATE TABLE IF NOT EXISTS journals (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            title               TEXT NOT NULL,
            issn                TEXT NOT NULL UNIQUE,
            description         TEXT,
            publisher           TEXT,
            access_type         TEXT,
            subject_area        TEXT,
            category            TEXT,
            discipline          TEXT,
            impact_factor       TEXT,
            cover_image         TEXT,
            banner_image        TEXT,
            flyer_image         TEXT,
            shortcode           TEXT,
            home_page_content   TEXT,
            aims_scope          TEXT,
            guidelines          TEXT,
            archive_content     TEXT,
            articles_in_press   TEXT,
            editorial_board     TEXT,
            created_at          DATETIME NOT NULL,
            updated_at          DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS journal_shortcodes (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            shortcode       TEXT NOT NULL UNIQUE,
            journal_name    TEXT NOT NULL,
            journal_id      INTEGER NOT NULL,
            created_at      DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS articles (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            journal_id          INTEGER NOT NULL REFERENCES journals(id) ON DELETE CASCADE,
            title               TEXT NOT NULL,
            abstract_text       TEXT NOT NULL,
            keywords            TEXT,
            article_type        TEXT,
            status              TEXT NOT NULL DEFAULT 'PENDING',
            volume_no           TEXT,
            issue_no            TEXT,
            issue_month         TEXT,
            year                TEXT,
            pdf_url             TEXT,
            word_url            TEXT,
            submitter_name      TEXT,
            submitter_email     TEXT,
            submitter_address   TEXT,
            submitter_country   TEXT,
            submitted_at        DATETIME NOT NULL,
            accepted_at         DATETIME,
            published_at        DATETIME
        );

        CREATE INDEX IF NOT EXISTS idx_articles_journal_status
            ON articles (journal_id, status);

        CREATE TABLE IF NOT EXISTS authors (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id      INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            position        INTEGER NOT NULL,
            name            TEXT NOT NULL,
            email           TEXT,
            affiliation     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_authors_article ON authors (article_id, position);

        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_name       TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            is_active       INTEGER NOT NULL DEFAULT 1,
            journal_name    TEXT,
            category        TEXT,
            created_at      DATETIME NOT NULL
        );",
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Fresh on-disk database so several connections can share it.
    pub fn temp_database() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("test.db"));
        db.init().expect("schema applies");
        (dir, db)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_database;

    #[test]
    fn schema_is_idempotent() {
        let (_dir, db) = temp_database();
        db.init().unwrap();
        let conn = db.connect().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('journals', 'journal_shortcodes', 'articles', 'authors', 'users')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }
}
