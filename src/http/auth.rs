use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::application::AppError;
use crate::domain::UserId;

use super::{ApiError, AppState};

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;
    let user_id = state.service.authenticate(token)?;

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AppError::Unauthenticated)?;

    let header = header.to_str().map_err(|_| AppError::Unauthenticated)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthenticated)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(AppError::Unauthenticated);
    }

    Ok(token)
}
