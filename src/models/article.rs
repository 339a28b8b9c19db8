use crate::{errors::AppError, models::response::ValidationResponse};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArticleStatus {
    Pending,
    UnderReview,
    Accepted,
    Published,
    Rejected,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 5] = [
        ArticleStatus::Pending,
        ArticleStatus::UnderReview,
        ArticleStatus::Accepted,
        ArticleStatus::Published,
        ArticleStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Pending => "PENDING",
            ArticleStatus::UnderReview => "UNDER_REVIEW",
            ArticleStatus::Accepted => "ACCEPTED",
            ArticleStatus::Published => "PUBLISHED",
            ArticleStatus::Rejected => "REJECTED",
        }
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        ArticleStatus::Pending
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArticleStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown article status '{}'", s))
    }
}

impl ToSql for ArticleStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ArticleStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub affiliation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAuthor {
    #[validate(length(min = 1, message = "Author name cannot be empty"))]
    pub name: String,
    #[validate(email(message = "Invalid author email address"))]
    pub email: Option<String>,
    pub affiliation: Option<String>,
}

/// Volume/issue placement assigned when an article is published.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueAssignment {
    pub volume_no: Option<String>,
    pub issue_no: Option<String>,
    pub issue_month: Option<String>,
    pub year: Option<String>,
}

impl IssueAssignment {
    pub fn is_empty(&self) -> bool {
        self.volume_no.is_none()
            && self.issue_no.is_none()
            && self.issue_month.is_none()
            && self.year.is_none()
    }
}

/// The manuscript record as stored, including submitter details.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub journal_id: i64,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Option<String>,
    pub article_type: Option<String>,
    pub status: ArticleStatus,
    #[serde(flatten)]
    pub issue: IssueAssignment,
    pub pdf_url: Option<String>,
    pub word_url: Option<String>,
    pub submitter_name: Option<String>,
    pub submitter_email: Option<String>,
    pub submitter_address: Option<String>,
    pub submitter_country: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub authors: Vec<Author>,
}

/// Public view of an article: everything except the submitter's contact data.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub id: i64,
    pub journal_id: i64,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Option<String>,
    pub article_type: Option<String>,
    pub status: ArticleStatus,
    #[serde(flatten)]
    pub issue: IssueAssignment,
    pub pdf_url: Option<String>,
    pub word_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub authors: Vec<Author>,
}

impl From<Article> for ArticleSummary {
    fn from(article: Article) -> Self {
        Self {
            id: article.id,
            journal_id: article.journal_id,
            title: article.title,
            abstract_text: article.abstract_text,
            keywords: article.keywords,
            article_type: article.article_type,
            status: article.status,
            issue: article.issue,
            pdf_url: article.pdf_url,
            word_url: article.word_url,
            submitted_at: article.submitted_at,
            published_at: article.published_at,
            authors: article.authors,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewArticle {
    #[validate(range(min = 1, message = "A journal must be selected"))]
    pub journal_id: i64,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(rename = "abstract")]
    #[validate(length(min = 1, message = "Abstract is required"))]
    pub abstract_text: String,
    pub keywords: Option<String>,
    pub article_type: Option<String>,
    /// Only honoured for administrative creation; submissions always start PENDING.
    pub status: Option<ArticleStatus>,
    #[serde(flatten)]
    pub issue: IssueAssignment,
    pub pdf_url: Option<String>,
    pub word_url: Option<String>,
    pub submitter_name: Option<String>,
    #[validate(email(message = "Invalid submitter email address"))]
    pub submitter_email: Option<String>,
    pub submitter_address: Option<String>,
    pub submitter_country: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub authors: Vec<NewAuthor>,
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

impl NewArticle {
    /// Trims required text so whitespace-only values fail validation.
    pub fn check(&mut self) -> Result<(), AppError> {
        trim_in_place(&mut self.title);
        trim_in_place(&mut self.abstract_text);
        for author in &mut self.authors {
            trim_in_place(&mut author.name);
        }
        self.validate()?;
        Ok(())
    }
}

/// Editable content of an existing article. Status, journal and submitter
/// details are deliberately absent.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ArticleUpdate {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    #[validate(length(min = 1, message = "Abstract cannot be empty"))]
    pub abstract_text: Option<String>,
    pub keywords: Option<String>,
    pub article_type: Option<String>,
    #[serde(flatten)]
    pub issue: IssueAssignment,
    pub authors: Option<Vec<NewAuthor>>,
}

impl ArticleUpdate {
    /// Field checks plus the replacement author list, when one is supplied.
    pub fn check(&mut self) -> Result<(), AppError> {
        for value in [&mut self.title, &mut self.abstract_text].into_iter().flatten() {
            trim_in_place(value);
        }
        for author in self.authors.iter_mut().flatten() {
            trim_in_place(&mut author.name);
        }
        self.validate()?;
        if let Some(authors) = &self.authors {
            let mut fields = Vec::new();
            for (index, author) in authors.iter().enumerate() {
                if let Err(AppError::Validation(errs)) = author.validate().map_err(AppError::from) {
                    fields.extend(errs.into_iter().map(|e| ValidationResponse {
                        field: format!("authors[{}].{}", index, e.field),
                        message: e.message,
                    }));
                }
            }
            if !fields.is_empty() {
                return Err(AppError::Validation(fields));
            }
        }
        Ok(())
    }
}

/// Body of `POST /admin/articles/{id}/status`.
///
/// Clients should send `expectedStatus`, the status they last displayed. A
/// caller that lost a race then gets `Conflict`. Without it the request is
/// checked against whatever status won, so a loser arriving after the
/// winner committed gets `InvalidTransition` instead (e.g. ACCEPTED to REJECTED).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub status: ArticleStatus,
    pub expected_status: Option<ArticleStatus>,
    #[serde(flatten)]
    pub issue: IssueAssignment,
}

/// One archived issue with its published articles.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveIssue {
    pub volume_no: Option<String>,
    pub issue_no: Option<String>,
    pub year: Option<String>,
    pub articles: Vec<ArticleSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ArticleStatus::UnderReview).unwrap(),
            "\"UNDER_REVIEW\""
        );
        assert_eq!(
            "under_review".parse::<ArticleStatus>(),
            Ok(ArticleStatus::UnderReview)
        );
        assert!("ARCHIVED".parse::<ArticleStatus>().is_err());
    }

    #[test]
    fn new_article_requires_title_and_valid_emails() {
        let article = NewArticle {
            journal_id: 1,
            title: String::new(),
            abstract_text: "An abstract".to_string(),
            submitter_email: Some("not-an-email".to_string()),
            authors: vec![NewAuthor {
                name: "Ada".to_string(),
                email: Some("ada@example.org".to_string()),
                affiliation: None,
            }],
            ..Default::default()
        };

        let errors = article.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("submitter_email"));
        assert!(!fields.contains_key("abstract_text"));
    }

    #[test]
    fn whitespace_only_required_fields_are_rejected() {
        let mut article = NewArticle {
            journal_id: 1,
            title: "   ".to_string(),
            abstract_text: " \n\t".to_string(),
            authors: vec![NewAuthor {
                name: " ".to_string(),
                email: None,
                affiliation: None,
            }],
            ..Default::default()
        };

        let Err(AppError::Validation(errors)) = article.check() else {
            panic!("blank fields should not validate");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"title"), "{:?}", fields);
        assert!(fields.iter().any(|f| f.starts_with("abstract")), "{:?}", fields);
        assert!(fields.iter().any(|f| f.contains("name")), "{:?}", fields);
    }

    #[test]
    fn check_trims_surrounding_whitespace() {
        let mut article = NewArticle {
            journal_id: 1,
            title: "  Learning Rust ".to_string(),
            abstract_text: "An abstract\n".to_string(),
            authors: vec![NewAuthor {
                name: " Ada ".to_string(),
                email: None,
                affiliation: None,
            }],
            ..Default::default()
        };
        article.check().unwrap();
        assert_eq!(article.title, "Learning Rust");
        assert_eq!(article.abstract_text, "An abstract");
        assert_eq!(article.authors[0].name, "Ada");
    }

    #[test]
    fn blank_update_fields_are_rejected() {
        let mut update = ArticleUpdate {
            title: Some("  ".to_string()),
            authors: Some(vec![NewAuthor {
                name: "\t".to_string(),
                email: None,
                affiliation: None,
            }]),
            ..Default::default()
        };
        assert!(matches!(update.check(), Err(AppError::Validation(_))));

        let mut update = ArticleUpdate {
            abstract_text: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(matches!(update.check(), Err(AppError::Validation(_))));
    }

    #[test]
    fn summary_drops_submitter_contact() {
        let json = serde_json::to_value(ArticleSummary {
            id: 1,
            journal_id: 2,
            title: "T".to_string(),
            abstract_text: "A".to_string(),
            keywords: None,
            article_type: None,
            status: ArticleStatus::Published,
            issue: IssueAssignment::default(),
            pdf_url: None,
            word_url: None,
            submitted_at: Utc::now(),
            published_at: None,
            authors: vec![],
        })
        .unwrap();
        assert!(json.get("submitterEmail").is_none());
        assert_eq!(json["abstract"], "A");
        assert_eq!(json["status"], "PUBLISHED");
    }
}
