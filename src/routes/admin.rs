use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use validator::Validate;

use crate::{
    db::{
        article_repository::ArticleRepository, journal_repository::JournalRepository,
        shortcode_repository::ShortcodeRepository, user_repository::UserRepository,
    },
    errors::AppError,
    models::{
        article::{Article, ArticleUpdate, NewArticle, TransitionRequest},
        journal::{JournalUpdate, NewJournal},
        query::{ArticleQuery, Audience},
        response::UploadResponse,
        shortcode::NewShortcode,
        user::{NewUser, Role},
    },
    routes::auth::{require_admin, AdminContext},
    storage::AllowedTypes,
    utils::{self, run_db, security::hash_password},
    AppState,
};

// Loads an article and checks the caller may touch its journal.
async fn scoped_article(
    state: &AppState,
    ctx: &AdminContext,
    article_id: i64,
) -> Result<Article, AppError> {
    let article = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).get_by_id(article_id)
    })
    .await?;
    ctx.ensure_journal(article.journal_id)?;
    Ok(article)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardSummary {
    #[serde(flatten)]
    role: Role,
    total: u64,
    by_status: BTreeMap<String, u64>,
}

#[get("/dashboard")]
pub async fn dashboard(
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let scope = ctx.role.journal_scope();
    let counts = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).count_by_status(scope)
    })
    .await?;

    let by_status: BTreeMap<String, u64> = counts
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();
    Ok(HttpResponse::Ok().json(DashboardSummary {
        role: ctx.role,
        total: by_status.values().sum(),
        by_status,
    }))
}

// --- Articles ---

#[get("/articles")]
pub async fn list_articles(
    session: Session,
    state: web::Data<AppState>,
    query: web::Query<ArticleQuery>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let mut query = query.into_inner();
    if let Some(own) = ctx.role.journal_scope() {
        if let Some(requested) = query.journal_id {
            ctx.ensure_journal(requested)?;
        }
        query.journal_id = Some(own);
    }

    let page = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).query(&query, Audience::Admin)
    })
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/articles")]
pub async fn create_article(
    session: Session,
    state: web::Data<AppState>,
    body: web::Json<NewArticle>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let mut article = body.into_inner();
    ctx.ensure_journal(article.journal_id)?;
    article.check()?;
    utils::check_file_reference(&state.resolver, "pdfUrl", &mut article.pdf_url)?;
    utils::check_file_reference(&state.resolver, "wordUrl", &mut article.word_url)?;

    let created = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).create(&article, Utc::now())
    })
    .await?;
    info!(
        "{} created article {} with status {}",
        ctx.user.user_name, created.id, created.status
    );
    Ok(HttpResponse::Created().json(created))
}

#[get("/articles/{id}")]
pub async fn get_article(
    session: Session,
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let article = scoped_article(&state, &ctx, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(article))
}

#[put("/articles/{id}")]
pub async fn update_article(
    session: Session,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    body: web::Json<ArticleUpdate>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let mut update = body.into_inner();
    update.check()?;
    let article = scoped_article(&state, &ctx, id.into_inner()).await?;

    let updated = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).update(article.id, &update)
    })
    .await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[delete("/articles/{id}")]
pub async fn delete_article(
    session: Session,
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let article = scoped_article(&state, &ctx, id.into_inner()).await?;
    let article_id = article.id;
    let removed = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).delete(article_id)
    })
    .await?;

    for reference in [removed.pdf_url.as_deref(), removed.word_url.as_deref()]
        .into_iter()
        .flatten()
    {
        utils::remove_local_upload(&state.resolver, reference).await;
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("Article with ID {} deleted successfully", article_id)
    })))
}

#[post("/articles/{id}/status")]
pub async fn transition_article(
    session: Session,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    body: web::Json<TransitionRequest>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let article = scoped_article(&state, &ctx, id.into_inner()).await?;
    let request = body.into_inner();
    let article_id = article.id;

    let outcome = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).transition_status(article_id, &request, Utc::now())
    })
    .await?;
    if !outcome.changed {
        debug!(
            "Article {} already {}, nothing to do",
            article_id, outcome.article.status
        );
    }
    Ok(HttpResponse::Ok().json(json!({
        "article": outcome.article,
        "changed": outcome.changed,
    })))
}

#[post("/articles/{id}/files")]
pub async fn replace_article_files(
    session: Session,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let article = scoped_article(&state, &ctx, id.into_inner()).await?;

    let mut pdf_url: Option<String> = None;
    let mut word_url: Option<String> = None;
    let read: Result<(), AppError> = async {
        while let Some(field_result) = payload.next().await {
            let field = field_result
                .map_err(|e| AppError::invalid("form", format!("Multipart error: {}", e)))?;
            let name = utils::field_name(&field)?;
            let (slot, allowed) = match name.as_str() {
                "pdf" => (&mut pdf_url, AllowedTypes::Pdf),
                "word" => (&mut word_url, AllowedTypes::Word),
                _ => {
                    utils::skip_field(field).await;
                    continue;
                }
            };
            if slot.is_some() {
                utils::skip_field(field).await;
                return Err(AppError::invalid(&name, "Only one file may be sent per field"));
            }
            if let Some(upload) = utils::ingest_field(&state.ingestor, field, allowed).await? {
                *slot = Some(upload.reference);
            }
        }
        if pdf_url.is_none() && word_url.is_none() {
            return Err(AppError::invalid("files", "Send a pdf or word file to replace"));
        }
        Ok(())
    }
    .await;

    let fresh: Vec<String> = pdf_url.iter().chain(word_url.iter()).cloned().collect();
    let result = match read {
        Ok(()) => {
            let (pdf, word) = (pdf_url.clone(), word_url.clone());
            let article_id = article.id;
            run_db(&state.db, move |conn| {
                ArticleRepository::new(conn).set_files(article_id, pdf.as_deref(), word.as_deref())
            })
            .await
        }
        Err(e) => Err(e),
    };

    let updated = match result {
        Ok(updated) => updated,
        Err(e) => {
            utils::discard_uploads(&state.resolver, &fresh).await;
            return Err(e);
        }
    };

    // Old files are only dropped once the new references are committed.
    let replaced = [
        (pdf_url.is_some(), article.pdf_url.as_deref()),
        (word_url.is_some(), article.word_url.as_deref()),
    ];
    for (was_replaced, old) in replaced {
        if let (true, Some(old)) = (was_replaced, old) {
            utils::remove_local_upload(&state.resolver, old).await;
        }
    }

    info!("{} replaced files of article {}", ctx.user.user_name, updated.id);
    Ok(HttpResponse::Ok().json(updated))
}

// --- Uploads ---

#[post("/uploads")]
pub async fn upload_file(
    session: Session,
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;

    let mut stored = None;
    while let Some(field_result) = payload.next().await {
        let field = field_result
            .map_err(|e| AppError::invalid("form", format!("Multipart error: {}", e)))?;
        if utils::field_name(&field)? != "file" || stored.is_some() {
            utils::skip_field(field).await;
            continue;
        }
        stored = utils::ingest_field(&state.ingestor, field, AllowedTypes::Document).await?;
    }

    let upload = stored.ok_or_else(|| AppError::invalid("file", "A file is required"))?;
    info!(
        "{} uploaded {} ({} bytes)",
        ctx.user.user_name, upload.reference, upload.size
    );
    Ok(HttpResponse::Created().json(UploadResponse {
        success: true,
        reference: upload.reference,
        content_type: upload.content_type.to_string(),
        size: upload.size,
    }))
}

#[get("/uploads")]
pub async fn list_uploads(
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_admin(&session, &state).await?.ensure_super_admin()?;
    let references = state.ingestor.list().await?;
    Ok(HttpResponse::Ok().json(references))
}

// --- Journals ---

#[post("/journals")]
pub async fn create_journal(
    session: Session,
    state: web::Data<AppState>,
    body: web::Json<NewJournal>,
) -> Result<HttpResponse, AppError> {
    require_admin(&session, &state).await?.ensure_super_admin()?;
    let journal = body.into_inner();
    journal.validate()?;

    let created = run_db(&state.db, move |conn| {
        JournalRepository::new(conn).create(&journal, Utc::now())
    })
    .await?;
    Ok(HttpResponse::Created().json(created))
}

#[put("/journals/{id}")]
pub async fn update_journal(
    session: Session,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    body: web::Json<JournalUpdate>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    let journal_id = id.into_inner();
    ctx.ensure_journal(journal_id)?;
    let update = body.into_inner();
    update.validate()?;

    let updated = run_db(&state.db, move |conn| {
        JournalRepository::new(conn).update(journal_id, &update, Utc::now())
    })
    .await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[delete("/journals/{id}")]
pub async fn delete_journal(
    session: Session,
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    ctx.ensure_super_admin()?;
    let journal_id = id.into_inner();
    run_db(&state.db, move |conn| {
        JournalRepository::new(conn).delete(journal_id)
    })
    .await?;
    warn!(
        "{} deleted journal {} and all of its articles",
        ctx.user.user_name, journal_id
    );
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("Journal with ID {} deleted successfully", journal_id)
    })))
}

// --- Shortcodes ---

#[get("/shortcodes")]
pub async fn list_shortcodes(
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_admin(&session, &state).await?.ensure_super_admin()?;
    let shortcodes = run_db(&state.db, |conn| ShortcodeRepository::new(conn).list_all()).await?;
    Ok(HttpResponse::Ok().json(shortcodes))
}

#[post("/shortcodes")]
pub async fn create_shortcode(
    session: Session,
    state: web::Data<AppState>,
    body: web::Json<NewShortcode>,
) -> Result<HttpResponse, AppError> {
    require_admin(&session, &state).await?.ensure_super_admin()?;
    let shortcode = body.into_inner();
    shortcode.validate()?;

    let created = run_db(&state.db, move |conn| {
        let journals = JournalRepository::new(conn);
        journals
            .get_by_id(shortcode.journal_id)
            .map_err(|_| AppError::invalid("journalId", "Journal does not exist"))?;
        ShortcodeRepository::new(journals.into_connection()).create(&shortcode, Utc::now())
    })
    .await?;
    Ok(HttpResponse::Created().json(created))
}

#[delete("/shortcodes/{code}")]
pub async fn delete_shortcode(
    session: Session,
    state: web::Data<AppState>,
    code: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&session, &state).await?.ensure_super_admin()?;
    let code = code.into_inner();
    let deleted = code.clone();
    run_db(&state.db, move |conn| ShortcodeRepository::new(conn).delete(&code)).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("Shortcode {} deleted", deleted)
    })))
}

// --- Users ---

#[post("/users")]
pub async fn create_user(
    session: Session,
    state: web::Data<AppState>,
    body: web::Json<NewUser>,
) -> Result<HttpResponse, AppError> {
    let ctx = require_admin(&session, &state).await?;
    ctx.ensure_super_admin()?;
    let new_user = body.into_inner();
    new_user.validate()?;

    let user = run_db(&state.db, move |conn| {
        let users = UserRepository::new(conn);
        if let Some(name) = new_user
            .journal_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            if users.journal_for_name(name)?.is_none() {
                return Err(AppError::invalid(
                    "journalName",
                    format!("No journal or shortcode matches {}", name),
                ));
            }
        }
        let password_hash = hash_password(&new_user.password)?;
        users.create(
            &new_user.user_name,
            &password_hash,
            new_user.journal_name.as_deref(),
            new_user.category.as_deref(),
            Utc::now(),
        )
    })
    .await?;
    info!("{} created admin account {}", ctx.user.user_name, user.user_name);
    Ok(HttpResponse::Created().json(user))
}
