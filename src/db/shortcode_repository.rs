use crate::{
    db::is_unique_violation,
    errors::AppError,
    models::shortcode::{JournalShortcode, NewShortcode},
};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult};

pub struct ShortcodeRepository {
    conn: Connection,
}

impl ShortcodeRepository {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn map_row_to_shortcode(row: &rusqlite::Row) -> RusqliteResult<JournalShortcode> {
        Ok(JournalShortcode {
            id: row.get(0)?,
            shortcode: row.get(1)?,
            journal_name: row.get(2)?,
            journal_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Shortcodes may be registered before the journal record carries one.
    pub fn create(
        &self,
        shortcode: &NewShortcode,
        now: DateTime<Utc>,
    ) -> Result<JournalShortcode, AppError> {
        let code = shortcode.shortcode.trim();
        self.conn
            .execute(
                "INSERT INTO journal_shortcodes (shortcode, journal_name, journal_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![code, shortcode.journal_name.trim(), shortcode.journal_id, now],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!("Shortcode {} is already taken", code))
                } else {
                    AppError::from(e)
                }
            })?;
        info!(
            "Registered shortcode {} for journal {}",
            code, shortcode.journal_id
        );
        self.find(code)?
            .ok_or_else(|| AppError::Internal(format!("Shortcode {} vanished after insert", code)))
    }

    pub fn find(&self, code: &str) -> Result<Option<JournalShortcode>, AppError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, shortcode, journal_name, journal_id, created_at
                 FROM journal_shortcodes WHERE shortcode = ?1 COLLATE NOCASE",
                params![code.trim()],
                Self::map_row_to_shortcode,
            )
            .optional()?)
    }

    /// Matches either the token itself or the display name it maps to.
    pub fn find_by_code_or_name(&self, value: &str) -> Result<Option<JournalShortcode>, AppError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, shortcode, journal_name, journal_id, created_at
                 FROM journal_shortcodes
                 WHERE shortcode = ?1 COLLATE NOCASE OR journal_name = ?1 COLLATE NOCASE
                 ORDER BY id LIMIT 1",
                params![value.trim()],
                Self::map_row_to_shortcode,
            )
            .optional()?)
    }

    pub fn list_all(&self) -> Result<Vec<JournalShortcode>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, shortcode, journal_name, journal_id, created_at
             FROM journal_shortcodes ORDER BY shortcode ASC",
        )?;
        let shortcodes = stmt
            .query_map([], Self::map_row_to_shortcode)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shortcodes)
    }

    pub fn delete(&self, code: &str) -> Result<(), AppError> {
        let rows = self.conn.execute(
            "DELETE FROM journal_shortcodes WHERE shortcode = ?1 COLLATE NOCASE",
            params![code.trim()],
        )?;
        if rows == 0 {
            return Err(AppError::NotFound(format!("Shortcode {} not found", code)));
        }
        info!("Removed shortcode {}", code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_support::temp_database;

    fn shortcode(code: &str, name: &str) -> NewShortcode {
        NewShortcode {
            shortcode: code.to_string(),
            journal_name: name.to_string(),
            journal_id: 1,
        }
    }

    #[test]
    fn codes_are_unique_and_case_insensitive() {
        let (_dir, db) = temp_database();
        let repo = ShortcodeRepository::new(db.connect().unwrap());
        repo.create(&shortcode("JOT", "Journal of Tests"), Utc::now())
            .unwrap();

        assert!(repo.find("jot").unwrap().is_some());
        assert!(matches!(
            repo.create(&shortcode("JOT", "Other"), Utc::now()),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            repo.find_by_code_or_name("journal of tests")
                .unwrap()
                .map(|s| s.shortcode),
            Some("JOT".to_string())
        );
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (_dir, db) = temp_database();
        let repo = ShortcodeRepository::new(db.connect().unwrap());
        assert!(matches!(repo.delete("NOPE"), Err(AppError::NotFound(_))));
    }
}
