//! Bearer token authentication middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

use crate::{
    error::{AttendanceError, AttendanceResult},
    policy,
    state::AppState,
    tokens::AuthUser,
};

pub type BearerHeader = TypedHeader<Authorization<Bearer>>;

/// Resolve an optional bearer header to the account behind it. Unknown or
/// expired tokens resolve to `None`.
pub async fn caller(
    state: &AppState,
    header: Option<BearerHeader>,
) -> AttendanceResult<Option<AuthUser>> {
    match header {
        Some(TypedHeader(Authorization(bearer))) => state.tokens.resolve(bearer.token()).await,
        None => Ok(None),
    }
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    header: Option<BearerHeader>,
    mut req: Request,
    next: Next,
) -> Result<Response, AttendanceError> {
    let user = caller(&state, header).await?.ok_or_else(|| {
        debug!("Rejected request to {} without a valid token", req.uri().path());
        AttendanceError::Unauthorized
    })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Lets only lecturers and developers through. Must run after [`require_auth`].
pub async fn require_privileged(req: Request, next: Next) -> Result<Response, AttendanceError> {
    let user = current_user(&req).ok_or(AttendanceError::Unauthorized)?;
    if !policy::is_privileged(user.role) {
        return Err(AttendanceError::Forbidden(
            "lecturer or developer role required".to_string(),
        ));
    }
    Ok(next.run(req).await)
}

/// Lets only developers through. Must run after [`require_auth`].
pub async fn require_developer(req: Request, next: Next) -> Result<Response, AttendanceError> {
    let user = current_user(&req).ok_or(AttendanceError::Unauthorized)?;
    if !policy::is_developer(user.role) {
        return Err(AttendanceError::Forbidden("developer role required".to_string()));
    }
    Ok(next.run(req).await)
}

/// Extract the authenticated user from the request extensions
pub fn current_user<B>(req: &axum::http::Request<B>) -> Option<&AuthUser> {
    req.extensions().get::<AuthUser>()
}
