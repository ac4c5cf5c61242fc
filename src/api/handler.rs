use super::cookie::*;
use super::error::*;
use crate::application_impl::KeyDistributor;
use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::header::{AUTHORIZATION, CACHE_CONTROL, SET_COOKIE};
use warp::{Reply, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub login: String,
    pub password: String,
}

/// Body of sign-in and refresh responses. The access token itself travels in
/// the `Authorization` header and the refresh token in its cookie.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub sessions_revoked: u64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub expires_at: i64,
}

fn session_reply(tokens: IssuedTokens) -> warp::reply::Response {
    let body = ApiResponse::ok(SessionResponse {
        user_id: tokens.user_id,
        device_id: tokens.device_id,
        access_token_expires_at: tokens.access_token_expires_at,
        refresh_token_expires_at: tokens.refresh_token_expires_at,
    });
    let reply = warp::reply::json(&body);
    let reply = warp::reply::with_header(
        reply,
        AUTHORIZATION,
        format!("Bearer {}", tokens.access_token.0),
    );
    let reply = warp::reply::with_header(
        reply,
        SET_COOKIE,
        refresh_cookie(&tokens.refresh_token, tokens.refresh_token_expires_at),
    );
    reply.into_response()
}

fn logout_reply(sessions_revoked: u64) -> warp::reply::Response {
    let reply = warp::reply::json(&ApiResponse::ok(LogoutResponse { sessions_revoked }));
    warp::reply::with_header(reply, SET_COOKIE, clear_refresh_cookie()).into_response()
}

fn refresh_token_from_cookie(cookie: Option<String>) -> Result<String, warp::Rejection> {
    cookie
        .as_deref()
        .and_then(decode_refresh_cookie)
        .ok_or_else(|| reject::custom(ApiErrorCode::Unauthorized))
}

pub async fn sign_in(
    body: SignInRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl Reply, warp::Rejection> {
    let input = SignInInput {
        login: body.login,
        password: body.password,
    };
    let tokens = auth_service
        .sign_in(input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(session_reply(tokens))
}

pub async fn refresh(
    cookie: Option<String>,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl Reply, warp::Rejection> {
    let refresh_token = refresh_token_from_cookie(cookie)?;
    let tokens = auth_service
        .refresh(&refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(session_reply(tokens))
}

pub async fn logout(
    claims: AccessClaims,
    cookie: Option<String>,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl Reply, warp::Rejection> {
    let refresh_token = refresh_token_from_cookie(cookie)?;
    auth_service
        .logout(claims.sub, &refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(logout_reply(1))
}

pub async fn logout_all(
    claims: AccessClaims,
    cookie: Option<String>,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl Reply, warp::Rejection> {
    let refresh_token = refresh_token_from_cookie(cookie)?;
    let revoked = auth_service
        .logout_all(claims.sub, &refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(logout_reply(revoked))
}

pub async fn jwks(distributor: Arc<KeyDistributor>) -> Result<impl Reply, warp::Rejection> {
    let reply = warp::reply::json(&distributor.jwks());
    Ok(warp::reply::with_header(
        reply,
        CACHE_CONTROL,
        "public, max-age=300",
    ))
}

pub async fn me(claims: AccessClaims) -> Result<impl Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(MeResponse {
        user_id: claims.sub,
        device_id: claims.device,
        expires_at: claims.exp,
    })))
}
