use crate::{
    db::is_unique_violation,
    errors::AppError,
    models::journal::{Journal, JournalContent, JournalUpdate, NewJournal},
};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult};

pub struct JournalRepository {
    conn: Connection,
}

/// Rows removed by `clear_all`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClearedCounts {
    pub journals: usize,
    pub articles: usize,
    pub authors: usize,
    pub shortcodes: usize,
}

impl JournalRepository {
    const SELECT_FIELDS: &'static str = "id, title, issn, description, publisher, access_type, \
         subject_area, category, discipline, impact_factor, cover_image, banner_image, \
         flyer_image, shortcode, home_page_content, aims_scope, guidelines, archive_content, \
         articles_in_press, editorial_board, created_at, updated_at";

    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Hands the connection on once the journal checks are done.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn map_row_to_journal(row: &rusqlite::Row) -> RusqliteResult<Journal> {
        Ok(Journal {
            id: row.get(0)?,
            title: row.get(1)?,
            issn: row.get(2)?,
            description: row.get(3)?,
            publisher: row.get(4)?,
            access_type: row.get(5)?,
            subject_area: row.get(6)?,
            category: row.get(7)?,
            discipline: row.get(8)?,
            impact_factor: row.get(9)?,
            cover_image: row.get(10)?,
            banner_image: row.get(11)?,
            flyer_image: row.get(12)?,
            shortcode: row.get(13)?,
            content: JournalContent {
                home_page_content: row.get(14)?,
                aims_scope: row.get(15)?,
                guidelines: row.get(16)?,
                archive_content: row.get(17)?,
                articles_in_press: row.get(18)?,
                editorial_board: row.get(19)?,
            },
            created_at: row.get(20)?,
            updated_at: row.get(21)?,
        })
    }

    fn map_unique_violation(e: rusqlite::Error, issn: &str) -> AppError {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("A journal with ISSN {} already exists", issn))
        } else {
            AppError::from(e)
        }
    }

    pub fn create(&self, journal: &NewJournal, now: DateTime<Utc>) -> Result<Journal, AppError> {
        let d = &journal.details;
        let issn = journal.issn.trim();
        self.conn
            .execute(
                "INSERT INTO journals (title, issn, description, publisher, access_type,
                     subject_area, category, discipline, impact_factor, cover_image,
                     banner_image, flyer_image, shortcode, home_page_content, aims_scope,
                     guidelines, archive_content, articles_in_press, editorial_board,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?20)",
                params![
                    journal.title.trim(),
                    issn,
                    d.description,
                    d.publisher,
                    d.access_type,
                    d.subject_area,
                    d.category,
                    d.discipline,
                    d.impact_factor,
                    d.cover_image,
                    d.banner_image,
                    d.flyer_image,
                    d.shortcode,
                    d.content.home_page_content,
                    d.content.aims_scope,
                    d.content.guidelines,
                    d.content.archive_content,
                    d.content.articles_in_press,
                    d.content.editorial_board,
                    now,
                ],
            )
            .map_err(|e| Self::map_unique_violation(e, issn))?;
        let id = self.conn.last_insert_rowid();
        info!("Created journal {} ({})", id, issn);
        self.get_by_id(id)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Journal, AppError> {
        let query = format!("SELECT {} FROM journals WHERE id = ?1", Self::SELECT_FIELDS);
        self.conn
            .query_row(&query, params![id], Self::map_row_to_journal)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Journal with ID {} not found", id)))
    }

    pub fn get_by_issn(&self, issn: &str) -> Result<Journal, AppError> {
        let query = format!("SELECT {} FROM journals WHERE issn = ?1", Self::SELECT_FIELDS);
        self.conn
            .query_row(&query, params![issn.trim()], Self::map_row_to_journal)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Journal with ISSN {} not found", issn)))
    }

    /// Looks the code up on the journal itself, then in the shortcode table.
    pub fn get_by_shortcode(&self, code: &str) -> Result<Journal, AppError> {
        let query = format!(
            "SELECT {} FROM journals
             WHERE shortcode = ?1 COLLATE NOCASE
                OR id = (SELECT journal_id FROM journal_shortcodes
                         WHERE shortcode = ?1 COLLATE NOCASE)
             ORDER BY id LIMIT 1",
            Self::SELECT_FIELDS
        );
        self.conn
            .query_row(&query, params![code.trim()], Self::map_row_to_journal)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Journal with shortcode {} not found", code)))
    }

    pub fn find_by_title(&self, title: &str) -> Result<Option<Journal>, AppError> {
        let query = format!(
            "SELECT {} FROM journals WHERE title = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
            Self::SELECT_FIELDS
        );
        Ok(self
            .conn
            .query_row(&query, params![title.trim()], Self::map_row_to_journal)
            .optional()?)
    }

    pub fn list_all(&self) -> Result<Vec<Journal>, AppError> {
        let query = format!(
            "SELECT {} FROM journals ORDER BY title COLLATE NOCASE ASC, id ASC",
            Self::SELECT_FIELDS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let journals = stmt
            .query_map([], Self::map_row_to_journal)?
            .collect::<Result<Vec<Journal>, _>>()?;
        Ok(journals)
    }

    pub fn update(
        &self,
        id: i64,
        update: &JournalUpdate,
        now: DateTime<Utc>,
    ) -> Result<Journal, AppError> {
        let d = &update.details;
        let issn = update.issn.as_deref().map(str::trim);
        let rows = self
            .conn
            .execute(
                "UPDATE journals SET
                     title = COALESCE(?1, title),
                     issn = COALESCE(?2, issn),
                     description = COALESCE(?3, description),
                     publisher = COALESCE(?4, publisher),
                     access_type = COALESCE(?5, access_type),
                     subject_area = COALESCE(?6, subject_area),
                     category = COALESCE(?7, category),
                     discipline = COALESCE(?8, discipline),
                     impact_factor = COALESCE(?9, impact_factor),
                     cover_image = COALESCE(?10, cover_image),
                     banner_image = COALESCE(?11, banner_image),
                     flyer_image = COALESCE(?12, flyer_image),
                     shortcode = COALESCE(?13, shortcode),
                     home_page_content = COALESCE(?14, home_page_content),
                     aims_scope = COALESCE(?15, aims_scope),
                     guidelines = COALESCE(?16, guidelines),
                     archive_content = COALESCE(?17, archive_content),
                     articles_in_press = COALESCE(?18, articles_in_press),
                     editorial_board = COALESCE(?19, editorial_board),
                     updated_at = ?20
                 WHERE id = ?21",
                params![
                    update.title.as_deref().map(str::trim),
                    issn,
                    d.description,
                    d.publisher,
                    d.access_type,
                    d.subject_area,
                    d.category,
                    d.discipline,
                    d.impact_factor,
                    d.cover_image,
                    d.banner_image,
                    d.flyer_image,
                    d.shortcode,
                    d.content.home_page_content,
                    d.content.aims_scope,
                    d.content.guidelines,
                    d.content.archive_content,
                    d.content.articles_in_press,
                    d.content.editorial_board,
                    now,
                    id,
                ],
            )
            .map_err(|e| Self::map_unique_violation(e, issn.unwrap_or_default()))?;
        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Journal with ID {} not found for update",
                id
            )));
        }
        info!("Updated journal {}", id);
        self.get_by_id(id)
    }

    /// Removes the journal; its articles and their authors go with it.
    pub fn delete(&self, id: i64) -> Result<(), AppError> {
        let rows = self
            .conn
            .execute("DELETE FROM journals WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(AppError::NotFound(format!("Journal with ID {} not found", id)));
        }
        info!("Deleted journal {}", id);
        Ok(())
    }

    /// Wipes journals, articles, authors and shortcodes in one transaction.
    pub fn clear_all(&mut self) -> Result<ClearedCounts, AppError> {
        let tx = self.conn.transaction()?;
        let counts = ClearedCounts {
            authors: tx.execute("DELETE FROM authors", [])?,
            articles: tx.execute("DELETE FROM articles", [])?,
            shortcodes: tx.execute("DELETE FROM journal_shortcodes", [])?,
            journals: tx.execute("DELETE FROM journals", [])?,
        };
        tx.commit()?;
        Ok(counts)
    }
}
