use crate::api::handler::ApiResponse;
use crate::application_port::*;
use serde::{Serialize, Serializer};
use std::convert::Infallible;
use thiserror::Error;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::http::header::RETRY_AFTER;
use warp::{Rejection, Reply, reject};

pub async fn recover_error(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        debug!(error = %e, "malformed request body");
        ApiErrorCode::InvalidRequest
    } else if err.find::<reject::MissingHeader>().is_some()
        || err.find::<reject::InvalidHeader>().is_some()
    {
        ApiErrorCode::Unauthorized
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else {
        ApiErrorCode::internal(format!("unhandled rejection: {err:?}"))
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    let mut response = warp::reply::with_status(json, code.status()).into_response();
    if let ApiErrorCode::AccountLocked { retry_after_secs } = code {
        if let Ok(value) = retry_after_secs.to_string().parse() {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
    }
    Ok(response)
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
pub enum ApiErrorCode {
    #[error("Malformed request")]
    InvalidRequest,
    #[error("Invalid login or password")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Account is temporarily locked")]
    AccountLocked { retry_after_secs: u64 },
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidCredentials | ApiErrorCode::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            ApiErrorCode::AccountLocked { .. } => StatusCode::LOCKED,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ApiErrorCode::InvalidRequest => "INVALID_REQUEST",
            ApiErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiErrorCode::Unauthorized => "UNAUTHORIZED",
            ApiErrorCode::AccountLocked { .. } => "ACCOUNT_LOCKED",
            ApiErrorCode::NotFound => "NOT_FOUND",
            ApiErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ApiErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl Serialize for ApiErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Validation(reason) => {
                debug!(%reason, "request rejected");
                ApiErrorCode::InvalidRequest
            }
            AuthError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            AuthError::AccountLocked { retry_after_secs } => {
                ApiErrorCode::AccountLocked { retry_after_secs }
            }
            // Every token failure looks the same from outside.
            e @ (AuthError::Integrity
            | AuthError::SecurityToken(_)
            | AuthError::TokenInvalid
            | AuthError::SignatureInvalid
            | AuthError::TokenExpired) => {
                debug!(error = %e, "token rejected");
                ApiErrorCode::Unauthorized
            }
            AuthError::KeyUnavailable {
                has_cached_key: false,
            } => ApiErrorCode::ServiceUnavailable,
            AuthError::KeyUnavailable {
                has_cached_key: true,
            } => ApiErrorCode::Unauthorized,
            AuthError::Store(e) => ApiErrorCode::internal(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}
