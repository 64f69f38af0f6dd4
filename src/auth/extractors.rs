use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use tracing::warn;

use super::{claims::TokenKind, jwt::JwtKeys};
use crate::{error::ApiError, state::AppState, users::repo_types::User};

/// Authenticated caller, resolved from a bearer access token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Caller that may be anonymous. A header that is present but invalid is
/// still rejected with 401.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<User>);

fn bearer_token(parts: &Parts) -> Result<Option<String>, ApiError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header"))?;
    Ok(Some(token.trim().to_string()))
}

/// Validates an access token and loads its user. Tokens whose version no
/// longer matches the user's are revoked.
pub(crate) async fn resolve_access_token(state: &AppState, token: &str) -> Result<User, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        ApiError::unauthorized("Invalid or expired token")
    })?;

    if claims.kind != TokenKind::Access {
        return Err(ApiError::unauthorized("Access token required"));
    }

    let user = state
        .store
        .get(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    if user.token_version != claims.ver {
        warn!(user_id = %user.id, "revoked token used");
        return Err(ApiError::unauthorized("Session expired"));
    }

    Ok(user)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or_else(|| {
            ApiError::unauthorized("Authentication credentials were not provided.")
        })?;
        Ok(AuthUser(resolve_access_token(state, &token).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(MaybeAuthUser(Some(resolve_access_token(state, &token).await?))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header_value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = header_value {
            builder = builder.header(header::AUTHORIZATION, v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert!(bearer_token(&parts_with(None)).unwrap().is_none());
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        let token = bearer_token(&parts_with(Some("Bearer abc.def"))).unwrap();
        assert_eq!(token.as_deref(), Some("abc.def"));
        let token = bearer_token(&parts_with(Some("bearer xyz"))).unwrap();
        assert_eq!(token.as_deref(), Some("xyz"));
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = bearer_token(&parts_with(Some("Basic dXNlcjpwYXNz"))).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
