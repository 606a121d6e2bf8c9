use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use axum::Extension;
use axum::extract::{ConnectInfo, FromRequestParts, Query};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::server::error::Error;
use crate::server::services::AppServices;
use crate::server::utils::token_utils::Claims;

/// generates a client identifier from IP address and user-agent
pub fn generate_client_id(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = DefaultHasher::new();
    ip.unwrap_or("unknown").hash(&mut hasher);
    user_agent.unwrap_or("unknown").hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// X-Forwarded-For, then X-Real-IP, then the socket address
fn client_id_from_parts(parts: &Parts) -> String {
    let user_agent = parts
        .headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok());

    let client_ip = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
        })
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        });

    generate_client_id(client_ip.as_deref(), user_agent)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn services_from_parts<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
) -> Result<AppServices, Error> {
    let Extension(services): Extension<AppServices> = Extension::from_request_parts(parts, state)
        .await
        .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;
    Ok(services)
}

/// hashed caller identity used for rate limiting, never for auth
pub struct ClientId(pub String);

impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientId(client_id_from_parts(parts)))
    }
}

/// a valid bearer session, any role
pub struct RequiredAuthentication(pub Claims, pub AppServices);

impl<S> FromRequestParts<S> for RequiredAuthentication
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let services = services_from_parts(parts, state).await?;

        let token = bearer_token(parts).ok_or(Error::Unauthorized)?;
        let claims = services.token_util.verify(token)?;

        debug!("Authenticated user {} ({})", claims.username, claims.sub);
        Ok(RequiredAuthentication(claims, services))
    }
}

/// a valid bearer session carrying the admin flag, 403 otherwise
pub struct AdminAuthentication(pub Claims, pub AppServices);

impl<S> FromRequestParts<S> for AdminAuthentication
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequiredAuthentication(claims, services) =
            RequiredAuthentication::from_request_parts(parts, state).await?;

        if !claims.is_admin {
            warn!("User {} tried an admin route", claims.username);
            return Err(Error::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminAuthentication(claims, services))
    }
}

#[derive(Default, Deserialize)]
struct StreamAuthQuery {
    url: Option<String>,
    token: Option<String>,
    sub: Option<String>,
    exp: Option<String>,
    sig: Option<String>,
}

/// Caller of the stream relay. Players can't set headers on every segment request, so
/// besides the bearer header this accepts the session token as `token=` or a signed
/// relay link (`sub`, `exp`, `sig` over the origin `url`) written by manifest rewriting.
pub struct StreamAuthentication {
    /// user id the relay links get signed for
    pub subject: String,
    pub client_id: String,
    pub services: AppServices,
}

impl<S> FromRequestParts<S> for StreamAuthentication
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let services = services_from_parts(parts, state).await?;
        let client_id = client_id_from_parts(parts);
        debug!("Relay request from client {}", client_id);

        let query: StreamAuthQuery = Query::from_request_parts(parts, state)
            .await
            .map(|Query(query)| query)
            .unwrap_or_default();

        // signed links first, they are what segment requests carry
        if let (Some(sub), Some(exp), Some(sig)) = (&query.sub, &query.exp, &query.sig) {
            let expiry = exp.parse::<i64>().map_err(|_| {
                warn!("invalid expiry timestamp on relay link");
                Error::Unauthorized
            })?;

            let url = query.url.as_deref().ok_or_else(|| {
                warn!("missing url parameter in signed relay link");
                Error::Unauthorized
            })?;

            if !services.signature_util.verify_signature(sub, expiry, url, sig) {
                warn!(
                    "Relay link signature invalid - url: {}, sub: {}, expiry: {}",
                    url, sub, expiry
                );
                return Err(Error::Unauthorized);
            }

            return Ok(StreamAuthentication {
                subject: sub.clone(),
                client_id,
                services,
            });
        }

        let header_token = bearer_token(parts);
        let token = query
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(header_token)
            .ok_or(Error::Unauthorized)?;

        let claims = services.token_util.verify(token)?;

        Ok(StreamAuthentication {
            subject: claims.sub,
            client_id,
            services,
        })
    }
}
