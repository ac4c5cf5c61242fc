use super::cookie::REFRESH_COOKIE;
use super::error::*;
use super::handler;
use crate::application_impl::AccessTokenValidator;
use crate::domain_model::AccessClaims;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Routes of the issuing service.
pub fn routes(
    server: Arc<IssuerServer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let sign_in = warp::path("sign-in")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::sign_in);

    let refresh = warp::path("refresh")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::cookie::optional(REFRESH_COOKIE))
        .and(with(server.auth_service.clone()))
        .and_then(handler::refresh);

    let logout_all = warp::path!("logout" / "all")
        .and(warp::post())
        .and(with_verification(server.access_validator.clone()))
        .and(warp::cookie::optional(REFRESH_COOKIE))
        .and(with(server.auth_service.clone()))
        .and_then(handler::logout_all);

    let logout = warp::path("logout")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_verification(server.access_validator.clone()))
        .and(warp::cookie::optional(REFRESH_COOKIE))
        .and(with(server.auth_service.clone()))
        .and_then(handler::logout);

    // Public keys are not secret; no authentication.
    let jwks = warp::path!(".well-known" / "jwks.json")
        .and(warp::get())
        .and(with(server.key_distributor.clone()))
        .and_then(handler::jwks);

    sign_in.or(refresh).or(logout_all).or(logout).or(jwks)
}

/// Routes of the verifying service.
pub fn verifier_routes(
    server: Arc<VerifierServer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("me")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_verification(server.access_validator.clone()))
        .and_then(handler::me)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    validator: Arc<AccessTokenValidator>,
) -> impl Filter<Extract = (AccessClaims,), Error = warp::Rejection> + Clone {
    warp::header::<String>("authorization").and_then(move |token: String| {
        let validator = validator.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let claims = validator
                    .validate(token.trim())
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(claims)
            } else {
                Err(reject::custom(ApiErrorCode::Unauthorized))
            }
        }
    })
}
