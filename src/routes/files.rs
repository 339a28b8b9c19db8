use actix_files::NamedFile;
use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    get,
    http::{
        header::{self, ContentDisposition, DispositionParam, DispositionType, HeaderValue},
        Method,
    },
    middleware::Next,
    web, Error as ActixError, HttpRequest, HttpResponse,
};
use log::{debug, error};

use crate::{
    errors::AppError,
    storage::{ResolvedFile, UPLOADS_PREFIX},
    AppState,
};

async fn serve_resolved(req: &HttpRequest, file: &ResolvedFile) -> Result<HttpResponse, AppError> {
    let named_file = NamedFile::open_async(&file.path).await.map_err(|io_err| {
        error!("Failed to open upload {:?}: {:?}", file.path, io_err);
        if io_err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("File {} disappeared", file.filename))
        } else {
            AppError::StorageUnavailable(format!("Error opening {}: {:?}", file.filename, io_err))
        }
    })?;

    let mut response = named_file
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file.filename.clone())],
        })
        .into_response(req);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(file.content_type),
    );
    Ok(response)
}

#[get("/uploads/{filename}")]
pub async fn download_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    filename: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let file = state.resolver.resolve(&filename)?;
    debug!("Serving upload {} from {:?}", file.filename, file.path);
    serve_resolved(&req, &file).await
}

/// Serves stored uploads under `/uploads/` before routing, with the same
/// headers as `download_upload`. Anything it cannot resolve falls through
/// to that route so misses get the usual JSON 404.
pub async fn serve_static_uploads<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, ActixError> {
    let is_read = matches!(*req.method(), Method::GET | Method::HEAD);
    let filename = match req.path().strip_prefix(UPLOADS_PREFIX) {
        Some(name) if is_read => name.to_string(),
        _ => return next.call(req).await.map(ServiceResponse::map_into_left_body),
    };
    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    };

    let served = match state.resolver.resolve(&filename) {
        Ok(file) => serve_resolved(req.request(), &file).await,
        Err(e) => Err(e),
    };
    match served {
        Ok(response) => Ok(req.into_response(response).map_into_right_body()),
        Err(e) => {
            debug!("Static upload {} not served: {}", filename, e);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
    }
}
