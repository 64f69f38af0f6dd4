use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest},
        jwt::JwtKeys,
        password::verify_password_blocking,
    },
    error::ApiError,
    extract::JsonBody,
    state::AppState,
    users::dto::UserRepresentation,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login/", post(login))
        .route("/auth/refresh/", post(refresh))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state.store.get_by_username(payload.username.trim()).await?;
    let stored = user.as_ref().map(|u| u.password_hash.clone());
    let valid = verify_password_blocking(payload.password, stored).await?;

    let user = match user {
        Some(user) if valid => user,
        Some(user) => {
            warn!(user_id = %user.id, "login invalid password");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        None => {
            warn!("login unknown username");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    let tokens = JwtKeys::from_ref(&state).issue_pair(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse::new(tokens, UserRepresentation::from(&user))))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        ApiError::unauthorized("Invalid or expired token")
    })?;

    let user = state
        .store
        .get(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    if user.token_version != claims.ver {
        warn!(user_id = %user.id, "revoked refresh token used");
        return Err(ApiError::unauthorized("Session expired"));
    }

    let tokens = keys.issue_pair(&user)?;
    Ok(Json(AuthResponse::new(tokens, UserRepresentation::from(&user))))
}
