use crate::{
    db::is_unique_violation,
    errors::AppError,
    models::user::{Role, User},
};
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult};

pub struct UserRepository {
    conn: Connection,
}

impl UserRepository {
    const SELECT_FIELDS: &'static str =
        "id, user_name, password_hash, is_active, journal_name, category, created_at";

    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn map_row_to_user(row: &rusqlite::Row) -> RusqliteResult<User> {
        Ok(User {
            id: row.get(0)?,
            user_name: row.get(1)?,
            password_hash: row.get(2)?,
            is_active: row.get(3)?,
            journal_name: row.get(4)?,
            category: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn find_by_user_name(&self, user_name: &str) -> Result<Option<User>, AppError> {
        let query = format!(
            "SELECT {} FROM users WHERE user_name = ?1",
            Self::SELECT_FIELDS
        );
        Ok(self
            .conn
            .query_row(&query, params![user_name.trim()], Self::map_row_to_user)
            .optional()?)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE id = ?1", Self::SELECT_FIELDS);
        Ok(self
            .conn
            .query_row(&query, params![id], Self::map_row_to_user)
            .optional()?)
    }

    /// Stores an account; `password_hash` must already be a bcrypt hash.
    pub fn create(
        &self,
        user_name: &str,
        password_hash: &str,
        journal_name: Option<&str>,
        category: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let user_name = user_name.trim();
        self.conn
            .execute(
                "INSERT INTO users (user_name, password_hash, is_active, journal_name, category,
                     created_at)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5)",
                params![user_name, password_hash, journal_name, category, now],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!("User {} already exists", user_name))
                } else {
                    AppError::from(e)
                }
            })?;
        let id = self.conn.last_insert_rowid();
        self.find_by_id(id)?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after insert", id)))
    }

    /// Journal a `journal_name` points at. Shortcode mappings win over the
    /// journal's own shortcode and title; mappings to a missing journal never match.
    pub fn journal_for_name(&self, name: &str) -> Result<Option<i64>, AppError> {
        Ok(self
            .conn
            .query_row(
                "SELECT j.id FROM journals j
                 LEFT JOIN journal_shortcodes s ON s.journal_id = j.id
                     AND (s.shortcode = ?1 COLLATE NOCASE OR s.journal_name = ?1 COLLATE NOCASE)
                 WHERE s.id IS NOT NULL
                    OR j.shortcode = ?1 COLLATE NOCASE
                    OR j.title = ?1 COLLATE NOCASE
                 ORDER BY s.id IS NULL, s.id, j.id
                 LIMIT 1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Accounts without a `journal_name` are super-admins. A name that no
    /// longer resolves to a journal locks the account out.
    pub fn resolve_role(&self, user: &User) -> Result<Role, AppError> {
        let Some(name) = user
            .journal_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            return Ok(Role::SuperAdmin);
        };

        match self.journal_for_name(name)? {
            Some(journal_id) => Ok(Role::JournalAdmin { journal_id }),
            None => {
                warn!(
                    "User {} is bound to unknown journal {:?}, denying access",
                    user.user_name, name
                );
                Err(AppError::Forbidden(format!(
                    "Journal {} is not registered; ask a super-admin to fix this account",
                    name
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        journal_repository::JournalRepository, schema::test_support::temp_database,
        shortcode_repository::ShortcodeRepository, Database,
    };
    use crate::models::{
        journal::{JournalDetails, NewJournal},
        shortcode::NewShortcode,
    };

    fn add_user(db: &Database, journal_name: Option<&str>) -> User {
        UserRepository::new(db.connect().unwrap())
            .create("editor", "$2b$04$hash", journal_name, None, Utc::now())
            .unwrap()
    }

    fn add_journal(db: &Database, title: &str, issn: &str) -> i64 {
        JournalRepository::new(db.connect().unwrap())
            .create(
                &NewJournal {
                    title: title.to_string(),
                    issn: issn.to_string(),
                    details: JournalDetails::default(),
                },
                Utc::now(),
            )
            .unwrap()
            .id
    }

    fn add_shortcode(db: &Database, code: &str, journal_id: i64) {
        ShortcodeRepository::new(db.connect().unwrap())
            .create(
                &NewShortcode {
                    shortcode: code.to_string(),
                    journal_name: "Journal of Tests".to_string(),
                    journal_id,
                },
                Utc::now(),
            )
            .unwrap();
    }

    fn role_of(db: &Database, user: &User) -> Result<Role, AppError> {
        UserRepository::new(db.connect().unwrap()).resolve_role(user)
    }

    #[test]
    fn duplicate_user_name_conflicts() {
        let (_dir, db) = temp_database();
        add_user(&db, None);
        let repo = UserRepository::new(db.connect().unwrap());
        assert!(matches!(
            repo.create("editor", "$2b$04$other", None, None, Utc::now()),
            Err(AppError::Conflict(_))
        ));
        assert!(repo.find_by_user_name("editor").unwrap().unwrap().is_active);
    }

    #[test]
    fn no_journal_name_means_super_admin() {
        let (_dir, db) = temp_database();
        let user = add_user(&db, Some("  "));
        assert_eq!(role_of(&db, &user).unwrap(), Role::SuperAdmin);
    }

    #[test]
    fn shortcode_mapping_scopes_the_account() {
        let (_dir, db) = temp_database();
        let journal_id = add_journal(&db, "Journal of Tests", "1234-5678");
        add_shortcode(&db, "JOT", journal_id);
        let user = add_user(&db, Some("jot"));
        assert_eq!(
            role_of(&db, &user).unwrap(),
            Role::JournalAdmin { journal_id }
        );
    }

    #[test]
    fn journal_title_scopes_the_account() {
        let (_dir, db) = temp_database();
        add_journal(&db, "Other Review", "2345-6789");
        let journal_id = add_journal(&db, "Journal of Tests", "1234-5678");
        let user = add_user(&db, Some("journal of tests"));
        assert_eq!(
            role_of(&db, &user).unwrap(),
            Role::JournalAdmin { journal_id }
        );
    }

    #[test]
    fn unknown_journal_name_is_forbidden() {
        let (_dir, db) = temp_database();
        add_journal(&db, "Journal of Tests", "1234-5678");
        let user = add_user(&db, Some("Jornal of Tests"));
        assert!(matches!(role_of(&db, &user), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn deleting_the_shortcode_locks_the_account_out() {
        let (_dir, db) = temp_database();
        let journal_id = add_journal(&db, "Journal of Tests", "1234-5678");
        add_shortcode(&db, "JOT", journal_id);
        let user = add_user(&db, Some("JOT"));
        assert!(role_of(&db, &user).is_ok());

        ShortcodeRepository::new(db.connect().unwrap())
            .delete("JOT")
            .unwrap();
        assert!(matches!(role_of(&db, &user), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn shortcode_for_a_missing_journal_does_not_scope() {
        let (_dir, db) = temp_database();
        add_shortcode(&db, "GONE", 42);
        let user = add_user(&db, Some("GONE"));
        assert!(matches!(role_of(&db, &user), Err(AppError::Forbidden(_))));
    }
}
