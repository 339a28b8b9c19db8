use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

static SHORTCODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{2,32}$").expect("shortcode pattern compiles"));

/// Token that ties a journal-admin account to the journal it may edit.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalShortcode {
    pub id: i64,
    pub shortcode: String,
    pub journal_name: String,
    pub journal_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewShortcode {
    #[validate(regex(
        path = *SHORTCODE_PATTERN,
        message = "Shortcode must be 2-32 letters or digits"
    ))]
    pub shortcode: String,
    #[validate(length(min = 1, message = "Journal name is required"))]
    pub journal_name: String,
    #[validate(range(min = 1, message = "A journal must be selected"))]
    pub journal_id: i64,
}
