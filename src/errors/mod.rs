use crate::models::{article::ArticleStatus, response::ValidationResponse};
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use derive_more::Display;
use log::error;
use serde::Serialize;

#[derive(Debug, Display)]
pub enum AppError {
    #[display("Invalid file reference: {_0}")]
    InvalidReference(String),
    #[display("Not found: {_0}")]
    NotFound(String),
    #[display("Cannot move article from {from} to {to}")]
    InvalidTransition {
        from: ArticleStatus,
        to: ArticleStatus,
    },
    #[display("Conflict: {_0}")]
    Conflict(String),
    #[display("Payload too large: {_0}")]
    PayloadTooLarge(String),
    #[display("Storage unavailable: {_0}")]
    StorageUnavailable(String),
    #[display("Invalid content type: {_0}")]
    InvalidContentType(String),
    #[display("Validation error: {}", join_fields(_0))]
    Validation(Vec<ValidationResponse>),
    #[display("Database error: {_0}")]
    Database(String),
    #[display("Unauthorized: {_0}")]
    Unauthorized(String),
    #[display("Forbidden: {_0}")]
    Forbidden(String),
    #[display("Hashing error: {_0}")]
    Hashing(String),
    #[display("Configuration error: {_0}")]
    Config(String),
    #[display("Internal error: {_0}")]
    Internal(String),
}

fn join_fields(fields: &[ValidationResponse]) -> String {
    fields
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<String>>()
        .join("; ")
}

impl std::error::Error for AppError {}

impl AppError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![ValidationResponse {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidReference(_) | AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::InvalidContentType(_) => "INVALID_CONTENT_TYPE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Hashing(_) | AppError::Config(_) | AppError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    // Text safe to hand back to the caller. Missing files and malformed names
    // look identical from outside so resolver internals never leak.
    fn public_message(&self) -> String {
        match self {
            AppError::InvalidReference(_) | AppError::NotFound(_) => {
                "Requested resource was not found".to_string()
            }
            AppError::InvalidTransition { from, to } => format!(
                "Article is currently {} and cannot move to {}",
                from, to
            ),
            AppError::Conflict(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::InvalidContentType(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg) => msg.clone(),
            AppError::Validation(fields) => join_fields(fields),
            AppError::StorageUnavailable(_) => "File storage is unavailable".to_string(),
            AppError::Database(_)
            | AppError::Hashing(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ValidationResponse>,
}

impl From<Vec<ValidationResponse>> for AppError {
    fn from(errors: Vec<ValidationResponse>) -> Self {
        AppError::Validation(errors)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = Vec::new();
        collect_field_errors("", &errors, &mut fields);
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(fields)
    }
}

// Flattens nested struct/list errors into `authors[0].email` style paths.
fn collect_field_errors(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<ValidationResponse>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                out.extend(errs.iter().map(|e| ValidationResponse {
                    field: path.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", e.code)),
                }));
            }
            ValidationErrorsKind::Struct(inner) => collect_field_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_field_errors(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("Blocking task failed: {}", err))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidReference(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_)
            | AppError::Hashing(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let fields = match self {
            AppError::Validation(fields) => fields.clone(),
            _ => Vec::new(),
        };
        HttpResponse::build(status).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.public_message(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_reference_and_missing_file_look_the_same() {
        let bad_name = AppError::InvalidReference("../../etc/passwd".to_string());
        let missing = AppError::NotFound("abc.pdf".to_string());

        assert_eq!(bad_name.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(bad_name.status_code(), missing.status_code());
        assert_eq!(bad_name.public_message(), missing.public_message());
        assert!(!bad_name.public_message().contains("passwd"));
    }

    #[test]
    fn transition_message_names_current_status() {
        let err = AppError::InvalidTransition {
            from: ArticleStatus::Rejected,
            to: ArticleStatus::Published,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.public_message().contains("REJECTED"));
    }

    #[test]
    fn server_errors_hide_details() {
        let err = AppError::Database("no such table: secrets".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("secrets"));
    }
}
