use crate::{
    errors::AppError,
    lifecycle::{initial_timestamps, plan_transition, validate_issue_assignment, TransitionPlan},
    models::{
        article::{
            ArchiveIssue, Article, ArticleStatus, ArticleSummary, ArticleUpdate, Author,
            IssueAssignment, NewArticle, NewAuthor, TransitionRequest,
        },
        query::{ArticleQuery, Audience, SortField, SortOrder},
        response::Page,
    },
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{
    params, params_from_iter, types::Value, Connection, OptionalExtension,
    Result as RusqliteResult,
};

pub const RELATED_LIMIT: u32 = 5;

pub struct ArticleRepository {
    conn: Connection,
}

/// Result of a status change request.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub article: Article,
    /// False when the article already had the requested status.
    pub changed: bool,
}

impl ArticleRepository {
    const SELECT_FIELDS: &'static str = "id, journal_id, title, abstract_text, keywords, \
         article_type, status, volume_no, issue_no, issue_month, year, pdf_url, word_url, \
         submitter_name, submitter_email, submitter_address, submitter_country, \
         submitted_at, accepted_at, published_at";

    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    // Authors are attached separately.
    fn map_row_to_article(row: &rusqlite::Row) -> RusqliteResult<Article> {
        Ok(Article {
            id: row.get(0)?,
            journal_id: row.get(1)?,
            title: row.get(2)?,
            abstract_text: row.get(3)?,
            keywords: row.get(4)?,
            article_type: row.get(5)?,
            status: row.get(6)?,
            issue: IssueAssignment {
                volume_no: row.get(7)?,
                issue_no: row.get(8)?,
                issue_month: row.get(9)?,
                year: row.get(10)?,
            },
            pdf_url: row.get(11)?,
            word_url: row.get(12)?,
            submitter_name: row.get(13)?,
            submitter_email: row.get(14)?,
            submitter_address: row.get(15)?,
            submitter_country: row.get(16)?,
            submitted_at: row.get(17)?,
            accepted_at: row.get(18)?,
            published_at: row.get(19)?,
            authors: Vec::new(),
        })
    }

    fn load_authors(&self, article_id: i64) -> Result<Vec<Author>, AppError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, email, affiliation FROM authors
             WHERE article_id = ?1 ORDER BY position ASC, id ASC",
        )?;
        let authors = stmt
            .query_map(params![article_id], |row| {
                Ok(Author {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    affiliation: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<Author>, _>>()?;
        Ok(authors)
    }

    fn with_authors(&self, mut articles: Vec<Article>) -> Result<Vec<Article>, AppError> {
        for article in &mut articles {
            article.authors = self.load_authors(article.id)?;
        }
        Ok(articles)
    }

    fn select_many(&self, sql: &str, values: Vec<Value>) -> Result<Vec<Article>, AppError> {
        let mut stmt = self.conn.prepare(sql)?;
        let articles = stmt
            .query_map(params_from_iter(values), Self::map_row_to_article)?
            .collect::<Result<Vec<Article>, _>>()?;
        self.with_authors(articles)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Article>, AppError> {
        let query = format!("SELECT {} FROM articles WHERE id = ?1", Self::SELECT_FIELDS);
        let article = self
            .conn
            .query_row(&query, params![id], Self::map_row_to_article)
            .optional()?;
        match article {
            Some(mut article) => {
                article.authors = self.load_authors(article.id)?;
                Ok(Some(article))
            }
            None => Ok(None),
        }
    }

    pub fn get_by_id(&self, id: i64) -> Result<Article, AppError> {
        self.find_by_id(id)?
            .ok_or_else(|| AppError::NotFound(format!("Article with ID {} not found", id)))
    }

    /// Like `get_by_id`, but unpublished articles do not exist for the public.
    pub fn get_visible(&self, id: i64, audience: Audience) -> Result<Article, AppError> {
        let article = self.get_by_id(id)?;
        if audience == Audience::Public && article.status != ArticleStatus::Published {
            return Err(AppError::NotFound(format!(
                "Article with ID {} is not published",
                id
            )));
        }
        Ok(article)
    }

    fn ensure_journal(conn: &Connection, journal_id: i64) -> Result<(), AppError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM journals WHERE id = ?1)",
            params![journal_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(AppError::invalid(
                "journalId",
                format!("Journal {} does not exist", journal_id),
            ));
        }
        Ok(())
    }

    fn insert_authors(
        conn: &Connection,
        article_id: i64,
        authors: &[NewAuthor],
    ) -> Result<(), AppError> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO authors (article_id, position, name, email, affiliation)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (position, author) in authors.iter().enumerate() {
            stmt.execute(params![
                article_id,
                position as i64,
                author.name.trim(),
                clean(&author.email),
                clean(&author.affiliation),
            ])?;
        }
        Ok(())
    }

    /// Inserts an article with its authors in one transaction.
    ///
    /// Submissions pass no status and start PENDING. Administrative creation
    /// may seed any status; the matching timestamp is set as if the article
    /// had just transitioned there.
    pub fn create(&mut self, article: &NewArticle, now: DateTime<Utc>) -> Result<Article, AppError> {
        let status = article.status.unwrap_or_default();
        let issue = normalized(&article.issue);
        if !issue.is_empty() {
            if status != ArticleStatus::Published {
                return Err(AppError::invalid(
                    "volumeNo",
                    "Issue placement can only be set on published articles",
                ));
            }
            validate_issue_assignment(&issue)?;
        }
        let (accepted_at, published_at) = initial_timestamps(status, now);

        let tx = self.conn.transaction()?;
        Self::ensure_journal(&tx, article.journal_id)?;
        tx.execute(
            "INSERT INTO articles (journal_id, title, abstract_text, keywords, article_type,
                 status, volume_no, issue_no, issue_month, year, pdf_url, word_url,
                 submitter_name, submitter_email, submitter_address, submitter_country,
                 submitted_at, accepted_at, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19)",
            params![
                article.journal_id,
                article.title.trim(),
                article.abstract_text.trim(),
                clean(&article.keywords),
                clean(&article.article_type),
                status,
                issue.volume_no,
                issue.issue_no,
                issue.issue_month,
                issue.year,
                clean(&article.pdf_url),
                clean(&article.word_url),
                clean(&article.submitter_name),
                clean(&article.submitter_email),
                clean(&article.submitter_address),
                clean(&article.submitter_country),
                now,
                accepted_at,
                published_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        Self::insert_authors(&tx, id, &article.authors)?;
        tx.commit()?;

        info!(
            "Created article {} in journal {} with status {}",
            id, article.journal_id, status
        );
        self.get_by_id(id)
    }

    /// Applies editable content. Status, journal and submitter data stay put.
    pub fn update(&mut self, id: i64, update: &ArticleUpdate) -> Result<Article, AppError> {
        let current = self.get_by_id(id)?;
        let issue_change = normalized(&update.issue);
        let issue = if issue_change.is_empty() {
            current.issue.clone()
        } else {
            if current.status != ArticleStatus::Published {
                return Err(AppError::invalid(
                    "volumeNo",
                    format!(
                        "Issue placement can only be set on published articles (currently {})",
                        current.status
                    ),
                ));
            }
            let merged = IssueAssignment {
                volume_no: issue_change.volume_no.or(current.issue.volume_no),
                issue_no: issue_change.issue_no.or(current.issue.issue_no),
                issue_month: issue_change.issue_month.or(current.issue.issue_month),
                year: issue_change.year.or(current.issue.year),
            };
            validate_issue_assignment(&merged)?;
            merged
        };

        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE articles SET
                 title = COALESCE(?1, title),
                 abstract_text = COALESCE(?2, abstract_text),
                 keywords = COALESCE(?3, keywords),
                 article_type = COALESCE(?4, article_type),
                 volume_no = ?5, issue_no = ?6, issue_month = ?7, year = ?8
             WHERE id = ?9",
            params![
                update.title.as_deref().map(str::trim),
                update.abstract_text.as_deref().map(str::trim),
                clean(&update.keywords),
                clean(&update.article_type),
                issue.volume_no,
                issue.issue_no,
                issue.issue_month,
                issue.year,
                id,
            ],
        )?;
        if let Some(authors) = &update.authors {
            tx.execute("DELETE FROM authors WHERE article_id = ?1", params![id])?;
            Self::insert_authors(&tx, id, authors)?;
        }
        tx.commit()?;

        info!("Updated article {}", id);
        self.get_by_id(id)
    }

    /// Replaces file references; `None` keeps the stored value.
    pub fn set_files(
        &self,
        id: i64,
        pdf_url: Option<&str>,
        word_url: Option<&str>,
    ) -> Result<Article, AppError> {
        let rows = self.conn.execute(
            "UPDATE articles SET pdf_url = COALESCE(?1, pdf_url), word_url = COALESCE(?2, word_url)
             WHERE id = ?3",
            params![pdf_url, word_url, id],
        )?;
        if rows == 0 {
            return Err(AppError::NotFound(format!("Article with ID {} not found", id)));
        }
        self.get_by_id(id)
    }

    /// Deletes the article and, through the foreign key, its authors.
    pub fn delete(&self, id: i64) -> Result<Article, AppError> {
        let article = self.get_by_id(id)?;
        let rows = self
            .conn
            .execute("DELETE FROM articles WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Article with ID {} could not be deleted (already removed?)",
                id
            )));
        }
        info!("Deleted article {}", id);
        Ok(article)
    }

    /// Moves an article along the lifecycle.
    ///
    /// The plan is computed from a fresh read; the write is conditional on
    /// the status still being the one the plan was made from, so of two
    /// racing requests at most one lands.
    pub fn transition_status(
        &self,
        id: i64,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError> {
        let current = self.get_by_id(id)?;
        let issue = normalized(&request.issue);

        let change = match plan_transition(
            &current,
            request.status,
            request.expected_status,
            &issue,
            now,
        )? {
            TransitionPlan::Unchanged => {
                return Ok(TransitionOutcome {
                    article: current,
                    changed: false,
                })
            }
            TransitionPlan::Apply(change) => change,
        };

        let assign_issue = change.issue.is_some();
        let placement = change.issue.clone().unwrap_or_default();
        let rows = self.conn.execute(
            "UPDATE articles SET
                 status = ?1,
                 accepted_at = COALESCE(accepted_at, ?2),
                 published_at = COALESCE(published_at, ?3),
                 volume_no = CASE WHEN ?4 THEN ?5 ELSE volume_no END,
                 issue_no = CASE WHEN ?4 THEN ?6 ELSE issue_no END,
                 issue_month = CASE WHEN ?4 THEN ?7 ELSE issue_month END,
                 year = CASE WHEN ?4 THEN ?8 ELSE year END
             WHERE id = ?9 AND status = ?10",
            params![
                change.to,
                change.accepted_at,
                change.published_at,
                assign_issue,
                placement.volume_no,
                placement.issue_no,
                placement.issue_month,
                placement.year,
                id,
                change.from,
            ],
        )?;

        if rows == 0 {
            let now_status: Option<ArticleStatus> = self
                .conn
                .query_row(
                    "SELECT status FROM articles WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            return match now_status {
                Some(status) => {
                    warn!(
                        "Lost race moving article {} from {} to {}; it is now {}",
                        id, change.from, change.to, status
                    );
                    Err(AppError::Conflict(format!(
                        "Article {} is currently {}; it was changed by another request",
                        id, status
                    )))
                }
                None => Err(AppError::NotFound(format!("Article with ID {} not found", id))),
            };
        }

        info!("Article {} moved from {} to {}", id, change.from, change.to);
        Ok(TransitionOutcome {
            article: self.get_by_id(id)?,
            changed: true,
        })
    }

    /// Filtered, sorted, offset-paginated listing.
    pub fn query(&self, query: &ArticleQuery, audience: Audience) -> Result<Page<Article>, AppError> {
        let (where_sql, values) = build_filter(query, audience);

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM articles WHERE {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let page = query.page();
        let page_size = query.page_size();
        let sql = format!(
            "SELECT {} FROM articles WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            Self::SELECT_FIELDS,
            where_sql,
            order_clause(
                query.sort_by.unwrap_or_default(),
                query.sort_order.unwrap_or_default()
            ),
        );
        let mut values = values;
        values.push(Value::Integer(page_size as i64));
        values.push(Value::Integer(query.offset() as i64));

        let items = self.select_many(&sql, values)?;
        Ok(Page::new(items, total.max(0) as u64, page, page_size))
    }

    /// Other published articles from the same journal, newest first.
    pub fn related(&self, id: i64) -> Result<Vec<ArticleSummary>, AppError> {
        let article = self.get_visible(id, Audience::Public)?;
        let sql = format!(
            "SELECT {} FROM articles
             WHERE journal_id = ? AND id <> ? AND status = 'PUBLISHED'
             ORDER BY published_at DESC, id DESC LIMIT ?",
            Self::SELECT_FIELDS
        );
        let related = self.select_many(
            &sql,
            vec![
                Value::Integer(article.journal_id),
                Value::Integer(article.id),
                Value::Integer(RELATED_LIMIT as i64),
            ],
        )?;
        Ok(related.into_iter().map(ArticleSummary::from).collect())
    }

    /// Accepted, not yet published.
    pub fn articles_in_press(&self, journal_id: i64) -> Result<Vec<ArticleSummary>, AppError> {
        let sql = format!(
            "SELECT {} FROM articles
             WHERE journal_id = ? AND status = 'ACCEPTED'
             ORDER BY accepted_at DESC, id DESC",
            Self::SELECT_FIELDS
        );
        let articles = self.select_many(&sql, vec![Value::Integer(journal_id)])?;
        Ok(articles.into_iter().map(ArticleSummary::from).collect())
    }

    /// Published articles not yet placed in a dated issue.
    pub fn current_issue(&self, journal_id: i64) -> Result<Vec<ArticleSummary>, AppError> {
        let sql = format!(
            "SELECT {} FROM articles
             WHERE journal_id = ? AND status = 'PUBLISHED'
               AND issue_month IS NULL AND year IS NULL
             ORDER BY published_at DESC, id DESC",
            Self::SELECT_FIELDS
        );
        let articles = self.select_many(&sql, vec![Value::Integer(journal_id)])?;
        Ok(articles.into_iter().map(ArticleSummary::from).collect())
    }

    /// Published articles grouped by (volume, issue, year), newest issue first.
    pub fn archive(
        &self,
        journal_id: i64,
        year: Option<i64>,
    ) -> Result<Vec<ArchiveIssue>, AppError> {
        let mut sql = format!(
            "SELECT {} FROM articles
             WHERE journal_id = ? AND status = 'PUBLISHED'
               AND NOT (issue_month IS NULL AND year IS NULL)",
            Self::SELECT_FIELDS
        );
        let mut values = vec![Value::Integer(journal_id)];
        if let Some(year) = year {
            sql.push_str(" AND CAST(year AS INTEGER) = ?");
            values.push(Value::Integer(year));
        }
        sql.push_str(
            " ORDER BY CAST(year AS INTEGER) DESC, CAST(volume_no AS INTEGER) DESC,
                 CAST(issue_no AS INTEGER) DESC, published_at DESC, id DESC",
        );

        let articles = self.select_many(&sql, values)?;
        Ok(group_into_issues(articles))
    }

    /// Row counts by status for one journal, or all journals.
    pub fn count_by_status(
        &self,
        journal_id: Option<i64>,
    ) -> Result<Vec<(ArticleStatus, u64)>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM articles
             WHERE ?1 IS NULL OR journal_id = ?1
             GROUP BY status",
        )?;
        let counts = stmt
            .query_map(params![journal_id], |row| {
                Ok((row.get::<_, ArticleStatus>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ArticleStatus::ALL
            .into_iter()
            .map(|status| {
                let count = counts
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map_or(0, |(_, c)| *c);
                (status, count)
            })
            .collect())
    }
}

fn clean(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// Numeric placement drops leading zeros so "05" and "5" are one volume.
fn canonical_number(value: &Option<String>) -> Option<String> {
    clean(value).map(|v| match v.parse::<u64>() {
        Ok(n) => n.to_string(),
        Err(_) => v.to_string(),
    })
}

// Blank strings from forms mean "not given".
fn normalized(issue: &IssueAssignment) -> IssueAssignment {
    IssueAssignment {
        volume_no: canonical_number(&issue.volume_no),
        issue_no: canonical_number(&issue.issue_no),
        issue_month: clean(&issue.issue_month).map(str::to_string),
        year: canonical_number(&issue.year),
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// WHERE clause and its positional values for a listing request.
fn build_filter(query: &ArticleQuery, audience: Audience) -> (String, Vec<Value>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = query.effective_status(audience) {
        clauses.push("status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(journal_id) = query.journal_id {
        clauses.push("journal_id = ?");
        values.push(Value::Integer(journal_id));
    }
    if let Some(term) = query.search_term() {
        clauses.push(
            "(title LIKE ? ESCAPE '\\' OR abstract_text LIKE ? ESCAPE '\\'
              OR EXISTS (SELECT 1 FROM authors au
                         WHERE au.article_id = articles.id AND au.name LIKE ? ESCAPE '\\'))",
        );
        let pattern = escape_like(term);
        values.extend(std::iter::repeat(Value::Text(pattern)).take(3));
    }

    if clauses.is_empty() {
        ("1 = 1".to_string(), values)
    } else {
        (clauses.join(" AND "), values)
    }
}

// `id` breaks ties so page boundaries are stable.
fn order_clause(sort: SortField, order: SortOrder) -> String {
    let dir = order.as_sql();
    let key = match sort {
        SortField::PublishedAt => format!("published_at IS NULL, published_at {}", dir),
        SortField::SubmittedAt => format!("submitted_at {}", dir),
        SortField::Title => format!("title COLLATE NOCASE {}", dir),
        SortField::Year => format!(
            "year IS NULL, CAST(year AS INTEGER) {0}, published_at {0}",
            dir
        ),
    };
    format!("{}, id {}", key, dir)
}

// Rows arrive in archive order. Keys are compared in canonical form so rows
// written before numbers were normalized still land in one issue.
fn group_into_issues(articles: Vec<Article>) -> Vec<ArchiveIssue> {
    let mut issues: Vec<ArchiveIssue> = Vec::new();
    for article in articles {
        let placement = normalized(&article.issue);
        let position = issues.iter().position(|issue| {
            issue.volume_no == placement.volume_no
                && issue.issue_no == placement.issue_no
                && issue.year == placement.year
        });
        let index = match position {
            Some(index) => index,
            None => {
                issues.push(ArchiveIssue {
                    volume_no: placement.volume_no,
                    issue_no: placement.issue_no,
                    year: placement.year,
                    articles: Vec::new(),
                });
                issues.len() - 1
            }
        };
        issues[index].articles.push(ArticleSummary::from(article));
    }
    issues
}
