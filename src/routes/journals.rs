use actix_web::{get, web, HttpResponse};

use crate::{
    db::{article_repository::ArticleRepository, journal_repository::JournalRepository},
    errors::AppError,
    models::query::ArchiveQuery,
    utils::run_db,
    AppState,
};

#[get("/api/journals")]
pub async fn list_journals(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let journals = run_db(&state.db, |conn| JournalRepository::new(conn).list_all()).await?;
    Ok(HttpResponse::Ok().json(journals))
}

#[get("/api/journals/{id}")]
pub async fn journal_by_id(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let journal_id = id.into_inner();
    let journal = run_db(&state.db, move |conn| {
        JournalRepository::new(conn).get_by_id(journal_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(journal))
}

#[get("/api/journals/issn/{issn}")]
pub async fn journal_by_issn(
    state: web::Data<AppState>,
    issn: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let issn = issn.into_inner();
    let journal = run_db(&state.db, move |conn| {
        JournalRepository::new(conn).get_by_issn(&issn)
    })
    .await?;
    Ok(HttpResponse::Ok().json(journal))
}

#[get("/api/journals/shortcode/{code}")]
pub async fn journal_by_shortcode(
    state: web::Data<AppState>,
    code: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let code = code.into_inner();
    let journal = run_db(&state.db, move |conn| {
        JournalRepository::new(conn).get_by_shortcode(&code)
    })
    .await?;
    Ok(HttpResponse::Ok().json(journal))
}

#[get("/api/journals/{id}/articles-in-press")]
pub async fn articles_in_press(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let journal_id = id.into_inner();
    let articles = run_db(&state.db, move |conn| {
        let journals = JournalRepository::new(conn);
        journals.get_by_id(journal_id)?;
        ArticleRepository::new(journals.into_connection()).articles_in_press(journal_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(articles))
}

#[get("/api/journals/{id}/current-issue")]
pub async fn current_issue(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let journal_id = id.into_inner();
    let articles = run_db(&state.db, move |conn| {
        let journals = JournalRepository::new(conn);
        journals.get_by_id(journal_id)?;
        ArticleRepository::new(journals.into_connection()).current_issue(journal_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(articles))
}

#[get("/api/journals/{id}/archive")]
pub async fn archive(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    query: web::Query<ArchiveQuery>,
) -> Result<HttpResponse, AppError> {
    let journal_id = id.into_inner();
    let year = parse_year(query.year.as_deref())?;
    let issues = run_db(&state.db, move |conn| {
        let journals = JournalRepository::new(conn);
        journals.get_by_id(journal_id)?;
        ArticleRepository::new(journals.into_connection()).archive(journal_id, year)
    })
    .await?;
    Ok(HttpResponse::Ok().json(issues))
}

fn parse_year(raw: Option<&str>) -> Result<Option<i64>, AppError> {
    match raw.map(str::trim).filter(|y| !y.is_empty()) {
        None => Ok(None),
        Some(year) => year
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::invalid("year", "Year must be a number")),
    }
}
