use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts, TypedHeader},
    headers::{authorization::Basic, Authorization},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};

use crate::auth::{AuthError, Authenticator};
use crate::clients::Client;
use crate::error::AppError;
use crate::rate_limit::RateLimiter;
use crate::sms::RequestMetadata;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_SECRET_HEADER: &str = "x-api-secret";

/// A client allowed to send right now: valid credentials, active, under both quotas
/// and within its per-second rate.
pub struct SendingClient(pub Client);

/// A client with valid credentials and an active account. Quotas are not checked, so
/// read-only endpoints stay reachable once a limit is hit.
pub struct ApiClient(pub Client);

/// Caller presented the configured admin Basic credentials.
pub struct AdminUser;

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
}

fn authenticator(parts: &Parts) -> Result<Arc<Authenticator>, AppError> {
    parts
        .extensions
        .get::<Arc<Authenticator>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("authenticator extension missing".into()))
}

fn enforce_rate_limit(parts: &Parts, client: &Client) -> Result<(), AppError> {
    let Some(limiter) = parts.extensions.get::<Arc<RateLimiter>>() else {
        return Ok(());
    };
    if limiter.check(client.id, client.rate_limit) {
        Ok(())
    } else {
        tracing::info!(client_id = %client.id, rate_limit = client.rate_limit, "rate limited");
        Err(AppError::RateLimited)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SendingClient
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = authenticator(parts)?;
        let client = auth
            .authenticate(
                header_value(&parts.headers, API_KEY_HEADER),
                header_value(&parts.headers, API_SECRET_HEADER),
            )
            .await?;
        enforce_rate_limit(parts, &client)?;
        Ok(SendingClient(client))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ApiClient
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = authenticator(parts)?;
        let client = auth
            .verify_credentials(
                header_value(&parts.headers, API_KEY_HEADER),
                header_value(&parts.headers, API_SECRET_HEADER),
            )
            .await?;
        enforce_rate_limit(parts, &client)?;
        Ok(ApiClient(client))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(basic)) =
            TypedHeader::<Authorization<Basic>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::AdminCredentialsRequired)?;
        authenticator(parts)?.basic_authenticate(basic.username(), basic.password())?;
        Ok(AdminUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_value(&parts.headers, "x-forwarded-for")
            .split(',')
            .next()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let real_ip = Some(header_value(&parts.headers, "x-real-ip")).filter(|v| !v.is_empty());
        let ip_address = forwarded
            .or(real_ip)
            .map(str::to_string)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();

        Ok(RequestMetadata {
            ip_address,
            user_agent: header_value(&parts.headers, USER_AGENT.as_str()).to_string(),
        })
    }
}
