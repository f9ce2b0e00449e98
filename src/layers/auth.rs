use crate::models::api::prelude::*;
use axum::extract::{FromRequestParts, Request as AxumExtractRequest};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::IntoResponse;

/// The caller's identity, produced upstream by JWT verification (an external
/// collaborator) and forwarded as a trusted header. This core never verifies
/// the token itself; it only trusts whatever already sits behind the gateway.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AuthedUser(pub i64);

const IDENTITY_HEADER: &str = "x-auth-user-id";

impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> ApiResult<Self> {
        parts
            .extensions
            .get::<AuthedUser>()
            .copied()
            .ok_or(internal!(
                "Cannot extract authed user. Is `identity_checker` enabled?"
            ))
    }
}

/// Reads the pre-verified identity header and stashes it as an extension.
/// A missing or malformed header means the gateway never authenticated the
/// request, which this core treats as `Authorization` failure.
pub async fn identity_checker(
    mut request: AxumExtractRequest,
    next: Next,
) -> ApiResult<impl IntoResponse> {
    let user_id = request
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(unauthorized!("Missing or invalid caller identity"))?;
    request.extensions_mut().insert(AuthedUser(user_id));
    Ok(next.run(request).await)
}
