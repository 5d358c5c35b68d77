use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod error;
pub(crate) mod extractors;
pub mod google;
pub mod handlers;
pub mod password;
pub mod session;
pub mod store;
pub mod strategy;
pub mod user;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
