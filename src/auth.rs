// src/auth.rs
//! Viewer identity. Authentication happens upstream; the proxy in front of
//! this service forwards the authenticated user as headers.

use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Role, Viewer, ViewerId};

pub const VIEWER_ID_HEADER: &str = "x-viewer-id";
pub const VIEWER_ROLE_HEADER: &str = "x-viewer-role";

/// Anonymous requests are allowed; a present but malformed identity is not.
#[derive(Debug, Clone, Copy)]
pub struct MaybeViewer(pub Option<Viewer>);

pub fn viewer_from_headers(headers: &HeaderMap) -> Result<Option<Viewer>, AppError> {
    let Some(raw_id) = headers.get(VIEWER_ID_HEADER) else {
        return Ok(None);
    };

    let id = raw_id
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or(AppError::Unauthorized)?;

    let role = match headers.get(VIEWER_ROLE_HEADER) {
        None => Role::default(),
        Some(raw_role) => {
            let role = raw_role.to_str().map_err(|_| AppError::Unauthorized)?;
            match role.trim().to_ascii_lowercase().as_str() {
                "admin" => Role::Admin,
                "user" => Role::User,
                _ => return Err(AppError::Unauthorized),
            }
        }
    };

    Ok(Some(Viewer { id: ViewerId(id), role }))
}

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_headers(&parts.headers)?.ok_or(AppError::Unauthorized)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeViewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_headers(&parts.headers).map(MaybeViewer)
    }
}
