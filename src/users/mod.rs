pub mod dto;
mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod serializer;
mod services;


use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::users_routes()
}
