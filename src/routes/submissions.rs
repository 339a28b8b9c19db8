use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use chrono::Utc;
use futures::StreamExt;
use log::{info, warn};

use crate::{
    db::article_repository::ArticleRepository,
    errors::AppError,
    models::{
        article::{NewArticle, NewAuthor},
        response::SubmissionResponse,
    },
    storage::AllowedTypes,
    utils::{self, run_db},
    AppState,
};

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_journal_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::invalid("journalId", "A journal must be selected"))
}

fn parse_authors(raw: &str) -> Result<Vec<NewAuthor>, AppError> {
    serde_json::from_str(raw).map_err(|e| {
        AppError::invalid(
            "authors",
            format!("Authors must be a JSON list of {{name, email, affiliation}}: {}", e),
        )
    })
}

// Reads the form into a NewArticle. Files are ingested as they arrive and
// their references pushed to `stored` so the caller can discard them.
async fn read_submission(
    state: &AppState,
    payload: &mut Multipart,
    stored: &mut Vec<String>,
) -> Result<NewArticle, AppError> {
    let mut article = NewArticle::default();
    let mut journal_id: Option<i64> = None;

    while let Some(field_result) = payload.next().await {
        let field = field_result
            .map_err(|e| AppError::invalid("form", format!("Multipart error: {}", e)))?;
        let name = utils::field_name(&field)?;

        match name.as_str() {
            "title" => article.title = utils::read_field(field).await?,
            "abstract" => article.abstract_text = utils::read_field(field).await?,
            "keywords" => article.keywords = optional(utils::read_field(field).await?),
            "articleType" => article.article_type = optional(utils::read_field(field).await?),
            "journalId" => journal_id = Some(parse_journal_id(&utils::read_field(field).await?)?),
            "submitterName" => article.submitter_name = optional(utils::read_field(field).await?),
            "submitterEmail" => article.submitter_email = optional(utils::read_field(field).await?),
            "submitterAddress" => {
                article.submitter_address = optional(utils::read_field(field).await?)
            }
            "submitterCountry" => {
                article.submitter_country = optional(utils::read_field(field).await?)
            }
            "authors" => article.authors = parse_authors(&utils::read_field(field).await?)?,
            "pdf" | "word" => {
                let (slot, allowed) = if name == "pdf" {
                    (&mut article.pdf_url, AllowedTypes::Pdf)
                } else {
                    (&mut article.word_url, AllowedTypes::Word)
                };
                if slot.is_some() {
                    utils::skip_field(field).await;
                    return Err(AppError::invalid(&name, "Only one file may be sent per field"));
                }
                if let Some(upload) = utils::ingest_field(&state.ingestor, field, allowed).await? {
                    stored.push(upload.reference.clone());
                    *slot = Some(upload.reference);
                }
            }
            _ => utils::skip_field(field).await,
        }
    }

    article.journal_id = journal_id
        .ok_or_else(|| AppError::invalid("journalId", "A journal must be selected"))?;
    // Public submissions always enter the pipeline as PENDING.
    article.status = None;
    article.check()?;
    if article.authors.is_empty() {
        return Err(AppError::invalid("authors", "At least one author is required"));
    }
    Ok(article)
}

#[post("/api/submissions")]
pub async fn submit_manuscript(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut stored = Vec::new();

    let result = match read_submission(&state, &mut payload, &mut stored).await {
        Ok(article) => {
            run_db(&state.db, move |conn| {
                ArticleRepository::new(conn).create(&article, Utc::now())
            })
            .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(article) => {
            info!(
                "Manuscript {} submitted to journal {}",
                article.id, article.journal_id
            );
            Ok(HttpResponse::Created().json(SubmissionResponse {
                success: true,
                article_id: article.id,
                status: article.status.to_string(),
                message: "Manuscript submitted successfully".to_string(),
            }))
        }
        Err(e) => {
            if !stored.is_empty() {
                warn!(
                    "Submission failed after storing {} file(s), removing them: {}",
                    stored.len(),
                    e
                );
                utils::discard_uploads(&state.resolver, &stored).await;
            }
            Err(e)
        }
    }
}
