use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

static ISSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{3}[\dXx]$").expect("issn pattern compiles"));

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
    pub id: i64,
    pub title: String,
    pub issn: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub access_type: Option<String>,
    pub subject_area: Option<String>,
    pub category: Option<String>,
    pub discipline: Option<String>,
    pub impact_factor: Option<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub flyer_image: Option<String>,
    pub shortcode: Option<String>,
    #[serde(flatten)]
    pub content: JournalContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editor-authored HTML blocks, stored and returned verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalContent {
    pub home_page_content: Option<String>,
    pub aims_scope: Option<String>,
    pub guidelines: Option<String>,
    pub archive_content: Option<String>,
    pub articles_in_press: Option<String>,
    pub editorial_board: Option<String>,
}

/// Descriptive fields shared by create and update payloads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalDetails {
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub access_type: Option<String>,
    pub subject_area: Option<String>,
    pub category: Option<String>,
    pub discipline: Option<String>,
    pub impact_factor: Option<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub flyer_image: Option<String>,
    pub shortcode: Option<String>,
    #[serde(flatten)]
    pub content: JournalContent,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewJournal {
    #[validate(length(min = 1, message = "Journal title is required"))]
    pub title: String,
    #[validate(regex(path = *ISSN_PATTERN, message = "ISSN must look like 1234-567X"))]
    pub issn: String,
    #[serde(flatten)]
    pub details: JournalDetails,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JournalUpdate {
    #[validate(length(min = 1, message = "Journal title cannot be empty"))]
    pub title: Option<String>,
    #[validate(regex(path = *ISSN_PATTERN, message = "ISSN must look like 1234-567X"))]
    pub issn: Option<String>,
    #[serde(flatten)]
    pub details: JournalDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issn_format_is_checked() {
        let journal = NewJournal {
            title: "Journal of Tests".to_string(),
            issn: "12345678".to_string(),
            ..Default::default()
        };
        assert!(journal.validate().unwrap_err().field_errors().contains_key("issn"));

        let journal = NewJournal {
            issn: "1234-567X".to_string(),
            ..journal
        };
        assert!(journal.validate().is_ok());
    }

    #[test]
    fn content_blocks_flatten_into_the_payload() {
        let journal: NewJournal = serde_json::from_str(
            r#"{"title":"T","issn":"1234-5678","aimsScope":"<p>Aims</p>","publisher":"P"}"#,
        )
        .unwrap();
        assert_eq!(journal.details.content.aims_scope.as_deref(), Some("<p>Aims</p>"));
        assert_eq!(journal.details.publisher.as_deref(), Some("P"));
    }
}
