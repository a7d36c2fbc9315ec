use crate::errors::GenericError;
use actix_web::{FromRequest, HttpRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct GenericResponse<D> {
    pub status: bool,
    pub customer_message: String,
    pub code: String,
    pub data: Option<D>,
}

impl<D> GenericResponse<D> {
    pub fn success(message: &str, data: Option<D>) -> Self {
        Self {
            status: true,
            customer_message: String::from(message),
            code: String::from("200"),
            data,
        }
    }

    pub fn error(message: &str, code: &str, data: Option<D>) -> Self {
        Self {
            status: false,
            customer_message: String::from(message),
            code: String::from(code),
            data,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "currency_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyType {
    Kes,
    Usd,
}

impl std::fmt::Display for CurrencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CurrencyType::Kes => "KES",
            CurrencyType::Usd => "USD",
        };
        write!(f, "{}", s)
    }
}

/// Requester context captured at the edge: the caller identity forwarded by
/// the auth gateway plus the source IP/user-agent kept for audit.
#[derive(Debug, Clone)]
pub struct RequestMetaData {
    pub customer_id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl FromRequest for RequestMetaData {
    type Error = GenericError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_http::Payload) -> Self::Future {
        let customer_id = req
            .headers()
            .get("x-customer-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok());
        let user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .map(String::from);
        ready(match customer_id {
            Some(customer_id) => Ok(RequestMetaData {
                customer_id,
                ip,
                user_agent,
                requested_at: Utc::now(),
            }),
            None => Err(GenericError::ValidationError(
                "x-customer-id header is missing or invalid".to_string(),
            )),
        })
    }
}
