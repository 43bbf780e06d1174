use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::api::AppState;
use crate::error::HubError;
use crate::models::User;

/// Extracts the caller's bearer token from the `Authorization` header,
/// resolves it against the credential store, and yields the owning
/// user. Missing header, malformed header, or an unknown token are all
/// indistinguishable `Unauthorized` to the caller.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(HubError::Unauthorized)?;

        let user = state
            .credentials
            .resolve(token)
            .await?
            .ok_or(HubError::Unauthorized)?;

        Ok(AuthUser(user))
    }
}
