use actix_web::{get, web, HttpResponse};

use crate::{
    db::article_repository::ArticleRepository,
    errors::AppError,
    models::{
        article::ArticleSummary,
        query::{ArticleQuery, Audience},
    },
    utils::run_db,
    AppState,
};

/// Public listing. Whatever `status` the caller asks for, only published
/// articles come back.
#[get("/api/articles")]
pub async fn list_articles(
    state: web::Data<AppState>,
    query: web::Query<ArticleQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let page = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).query(&query, Audience::Public)
    })
    .await?;
    Ok(HttpResponse::Ok().json(page.map(ArticleSummary::from)))
}

#[get("/api/articles/{id}")]
pub async fn article_by_id(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let article_id = id.into_inner();
    let article = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).get_visible(article_id, Audience::Public)
    })
    .await?;
    Ok(HttpResponse::Ok().json(ArticleSummary::from(article)))
}

#[get("/api/articles/{id}/related")]
pub async fn related_articles(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let article_id = id.into_inner();
    let related = run_db(&state.db, move |conn| {
        ArticleRepository::new(conn).related(article_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(related))
}
