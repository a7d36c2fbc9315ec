use super::store::StoreError;
use crate::errors::GenericError;
use crate::schemas::GenericResponse;
use crate::utils::error_chain_fmt;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

#[derive(thiserror::Error)]
pub enum PaymentError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    DataNotFound(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
    #[error("{0}")]
    UnexpectedCustomError(String),
    #[error("{0}")]
    DatabaseError(String, anyhow::Error),
}

impl std::fmt::Debug for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl From<PaymentError> for GenericError {
    fn from(err: PaymentError) -> GenericError {
        match err {
            PaymentError::ValidationError(message) => GenericError::ValidationError(message),
            PaymentError::ConflictError(message) => GenericError::ConflictError(message),
            PaymentError::DataNotFound(message) => GenericError::DataNotFound(message),
            PaymentError::UnexpectedError(error) => GenericError::UnexpectedError(error),
            PaymentError::UnexpectedCustomError(error) => {
                GenericError::UnexpectedCustomError(error)
            }
            PaymentError::DatabaseError(message, error) => {
                GenericError::DatabaseError(message, error)
            }
        }
    }
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> PaymentError {
        match err {
            StoreError::ActivePaymentExists(order_id) => PaymentError::ConflictError(format!(
                "An active payment already exists for order {}",
                order_id
            )),
            StoreError::NotFound => PaymentError::DataNotFound("Payment not found".to_string()),
            StoreError::PreconditionFailed => PaymentError::ConflictError(
                "The payment state has changed, re-fetch the payment".to_string(),
            ),
            StoreError::Unexpected(error) => {
                PaymentError::DatabaseError("A storage failure occurred".to_string(), error)
            }
        }
    }
}

#[derive(thiserror::Error)]
pub enum WebhookError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            WebhookError::ValidationError(_) => StatusCode::BAD_REQUEST,
            WebhookError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let status_code_str = status_code.as_str();
        let inner_error_msg = match self {
            WebhookError::AuthenticationError(message) => message.to_string(),
            WebhookError::ValidationError(message) => message.to_string(),
            WebhookError::UnexpectedError(inner_error) => inner_error.to_string(),
        };

        HttpResponse::build(status_code).json(GenericResponse::error(
            &inner_error_msg,
            status_code_str,
            Some(()),
        ))
    }
}
