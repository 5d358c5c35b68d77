use axum::{response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use crate::auth::dto::{Locals, UserView};
use crate::auth::extractors::{CurrentUser, OptionalUser};
use crate::state::AppState;

/// Routine page endpoints around the auth core: the public landing page and
/// the authenticated area logins redirect into. Rendering itself happens in
/// the view collaborator; these hand over the view-model.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(homepage))
        .route("/dashboard", get(dashboard))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    locals: Locals,
    user: Option<UserView>,
}

#[instrument(skip(user))]
async fn homepage(OptionalUser(user): OptionalUser) -> impl IntoResponse {
    Json(Page {
        locals: Locals::new(
            "Notes App - Organize Your Thoughts",
            "Free Notes App with beautiful design and powerful features.",
        ),
        user: user.as_ref().map(UserView::from),
    })
}

#[instrument(skip(user))]
async fn dashboard(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(Page {
        locals: Locals::new("Dashboard - Notes App", "Your notes at a glance."),
        user: Some(UserView::from(&user)),
    })
}
