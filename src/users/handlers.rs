use axum::{
    extract::{FromRef, Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{ChangePasswordRequest, ChangePasswordResponse, UserPayload, UserRepresentation},
    repo_types::{User, UserFilter},
    serializer::WriteMode,
    services,
};
use crate::{
    auth::{
        extractors::{AuthUser, MaybeAuthUser},
        jwt::JwtKeys,
        permissions::{
            check_object_permission, check_permission, AllowAny, IsAuthenticated,
            IsSelfOrReadOnly, Permission,
        },
    },
    error::ApiError,
    extract::{JsonBody, QueryParams},
    state::AppState,
};

const LIST_POLICY: AllowAny = AllowAny;
const DETAIL_POLICY: IsSelfOrReadOnly = IsSelfOrReadOnly;
const CURRENT_POLICY: IsAuthenticated = IsAuthenticated;

pub const PASSWORD_CHANGED: &str = "Password changed successfully";

type Body<T> = Result<JsonBody<T>, ApiError>;

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(create_user))
        .route(
            "/users/my/",
            get(get_current)
                .put(replace_current)
                .patch(patch_current)
                .delete(delete_current),
        )
        .route("/users/change-password/", post(change_password))
        .route(
            "/users/:id/",
            get(get_user)
                .put(replace_user)
                .patch(patch_user)
                .delete(delete_user),
        )
}

// --- target resolution ---

/// View check, lookup, then object check. Malformed ids are 404 like
/// unknown ones.
async fn resolve_target(
    state: &AppState,
    policy: &dyn Permission,
    method: &Method,
    caller: Option<&User>,
    raw_id: &str,
) -> Result<User, ApiError> {
    check_permission(policy, method, caller)?;
    let id = Uuid::parse_str(raw_id).map_err(|_| ApiError::NotFound)?;
    let target = state.store.get(id).await?.ok_or(ApiError::NotFound)?;
    check_object_permission(policy, method, caller, &target)?;
    Ok(target)
}

/// The caller is the target of every `/users/my/` request.
fn resolve_current(method: &Method, caller: Option<User>) -> Result<User, ApiError> {
    check_permission(&CURRENT_POLICY, method, caller.as_ref())?;
    let target = caller.ok_or_else(|| {
        ApiError::unauthorized("Authentication credentials were not provided.")
    })?;
    check_object_permission(&CURRENT_POLICY, method, Some(&target), &target)?;
    Ok(target)
}

async fn apply_update(
    state: &AppState,
    target: &User,
    body: Body<UserPayload>,
    mode: WriteMode,
) -> Result<Json<UserRepresentation>, ApiError> {
    let JsonBody(payload) = body?;
    let updated = services::update_user(state.store.as_ref(), target, payload, mode).await?;
    Ok(Json(updated.into()))
}

// --- /users/ ---

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    method: Method,
    QueryParams(params): QueryParams,
) -> Result<Json<Vec<UserRepresentation>>, ApiError> {
    check_permission(&LIST_POLICY, &method, None)?;
    let filter = UserFilter::from_params(params);
    let users = state.store.list(&filter).await?;
    Ok(Json(users.into_iter().map(UserRepresentation::from).collect()))
}

#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    method: Method,
    body: Body<UserPayload>,
) -> Result<impl IntoResponse, ApiError> {
    check_permission(&LIST_POLICY, &method, None)?;
    let JsonBody(payload) = body?;
    let user = services::create_user(state.store.as_ref(), payload).await?;
    let location = format!("/users/{}/", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(UserRepresentation::from(user)),
    ))
}

// --- /users/:id/ ---

#[instrument(skip(state, caller))]
pub async fn get_user(
    State(state): State<AppState>,
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserRepresentation>, ApiError> {
    let target = resolve_target(&state, &DETAIL_POLICY, &method, caller.as_ref(), &id).await?;
    Ok(Json(target.into()))
}

#[instrument(skip(state, caller, body))]
pub async fn replace_user(
    State(state): State<AppState>,
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<String>,
    body: Body<UserPayload>,
) -> Result<Json<UserRepresentation>, ApiError> {
    let target = resolve_target(&state, &DETAIL_POLICY, &method, caller.as_ref(), &id).await?;
    apply_update(&state, &target, body, WriteMode::Replace).await
}

#[instrument(skip(state, caller, body))]
pub async fn patch_user(
    State(state): State<AppState>,
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<String>,
    body: Body<UserPayload>,
) -> Result<Json<UserRepresentation>, ApiError> {
    let target = resolve_target(&state, &DETAIL_POLICY, &method, caller.as_ref(), &id).await?;
    apply_update(&state, &target, body, WriteMode::Partial).await
}

#[instrument(skip(state, caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target = resolve_target(&state, &DETAIL_POLICY, &method, caller.as_ref(), &id).await?;
    services::delete_user(state.store.as_ref(), &target).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- /users/my/ ---

#[instrument(skip(caller))]
pub async fn get_current(
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
) -> Result<Json<UserRepresentation>, ApiError> {
    let me = resolve_current(&method, caller)?;
    Ok(Json(me.into()))
}

#[instrument(skip(state, caller, body))]
pub async fn replace_current(
    State(state): State<AppState>,
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
    body: Body<UserPayload>,
) -> Result<Json<UserRepresentation>, ApiError> {
    let me = resolve_current(&method, caller)?;
    apply_update(&state, &me, body, WriteMode::Replace).await
}

#[instrument(skip(state, caller, body))]
pub async fn patch_current(
    State(state): State<AppState>,
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
    body: Body<UserPayload>,
) -> Result<Json<UserRepresentation>, ApiError> {
    let me = resolve_current(&method, caller)?;
    apply_update(&state, &me, body, WriteMode::Partial).await
}

#[instrument(skip(state, caller))]
pub async fn delete_current(
    State(state): State<AppState>,
    method: Method,
    MaybeAuthUser(caller): MaybeAuthUser,
) -> Result<StatusCode, ApiError> {
    let me = resolve_current(&method, caller)?;
    services::delete_user(state.store.as_ref(), &me).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- /users/change-password/ ---

#[instrument(skip(state, caller, body))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    body: Body<ChangePasswordRequest>,
) -> Result<Json<ChangePasswordResponse>, ApiError> {
    let JsonBody(payload) = body?;
    let keys = JwtKeys::from_ref(&state);
    let (_, tokens) = services::change_password(state.store.as_ref(), &keys, &caller, payload).await?;
    Ok(Json(ChangePasswordResponse {
        message: PASSWORD_CHANGED.to_string(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}
