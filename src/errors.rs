use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::schemas::GenericResponse;
use crate::utils::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum GenericError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    DataNotFound(String),
    #[error("{0}")]
    UnauthorizedError(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
    #[error("{0}")]
    UnexpectedCustomError(String),
    #[error("{0}")]
    DatabaseError(String, anyhow::Error),
}

impl std::fmt::Debug for GenericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for GenericError {
    fn status_code(&self) -> StatusCode {
        match self {
            GenericError::ValidationError(_) => StatusCode::BAD_REQUEST,
            GenericError::ConflictError(_) => StatusCode::CONFLICT,
            GenericError::DataNotFound(_) => StatusCode::GONE,
            GenericError::UnauthorizedError(_) => StatusCode::UNAUTHORIZED,
            GenericError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GenericError::UnexpectedCustomError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GenericError::DatabaseError(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let status_code_str = status_code.as_str();
        let inner_error_msg = match self {
            GenericError::ValidationError(message) => message.to_string(),
            GenericError::ConflictError(message) => message.to_string(),
            GenericError::DataNotFound(message) => message.to_string(),
            GenericError::UnauthorizedError(message) => message.to_string(),
            GenericError::UnexpectedError(inner_error) => inner_error.to_string(),
            GenericError::UnexpectedCustomError(message) => message.to_string(),
            GenericError::DatabaseError(message, _err) => message.to_string(),
        };

        HttpResponse::build(status_code).json(GenericResponse::error(
            &inner_error_msg,
            status_code_str,
            Some(()),
        ))
    }
}
