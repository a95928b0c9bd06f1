//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.
//!
//! Authentication itself happens upstream; the auth provider forwards the
//! verified user id in the `x-user-id` header.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::warn;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The verified caller, available to handlers as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

/// Middleware that reads the caller's id and inserts it into request extensions.
///
/// A missing or malformed header yields 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)
        .and_then(|raw| {
            Uuid::parse_str(raw.trim()).map_err(|_| {
                warn!("Rejected request with malformed {} header", USER_ID_HEADER);
                StatusCode::UNAUTHORIZED
            })
        })?;

    req.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(req).await)
}
