pub mod comment_handlers;

pub use comment_handlers::{health, show_comments, submit_comment, webhook_ping};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{middleware::Xsrf, AppState};

/// Route pattern of the webhook endpoint, for use with `Xsrf::with_exempt_route`.
pub const WEBHOOK_ROUTE: &str = "/webhooks/ping";

/// Demo application: a comment board behind the xsrf stage.
///
/// The webhook route is always exempted from token checks in addition to
/// whatever `xsrf` already exempts.
pub fn app_router(app_state: AppState, xsrf: Xsrf) -> Router {
    let routes = Router::new()
        .route("/comments", get(show_comments).post(submit_comment))
        .route(WEBHOOK_ROUTE, post(webhook_ping))
        .route("/health", get(health));

    xsrf.with_exempt_route(WEBHOOK_ROUTE)
        .protect(routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
