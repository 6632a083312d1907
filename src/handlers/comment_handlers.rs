use crate::{
    token::{XsrfFormHtml, XsrfToken},
    AppState,
};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Template, WebTemplate)]
#[template(path = "comments.html")]
pub struct CommentsTemplate {
    comments: Vec<String>,
    error_message: String,
    xsrf_form_html: XsrfFormHtml,
}

#[derive(Deserialize)]
pub struct CommentsQuery {
    error: Option<String>,
}

// The `_xsrf` field is checked by the middleware; serde ignores it here.
#[derive(Deserialize)]
pub struct CommentForm {
    pub body: String,
}

pub async fn show_comments(
    State(app_state): State<AppState>,
    Query(query): Query<CommentsQuery>,
    token: XsrfToken,
) -> CommentsTemplate {
    let comments = app_state.comments.read().await.clone();

    CommentsTemplate {
        comments,
        error_message: query.error.unwrap_or_default(),
        xsrf_form_html: token.form_html(),
    }
}

pub async fn submit_comment(
    State(app_state): State<AppState>,
    Form(form): Form<CommentForm>,
) -> Response {
    let body = form.body.trim();
    if body.is_empty() {
        return Redirect::to("/comments?error=Comment+cannot+be+empty").into_response();
    }

    app_state.comments.write().await.push(body.to_string());
    debug!("Stored comment ({} bytes)", body.len());

    Redirect::to("/comments").into_response()
}

/// Machine-to-machine endpoint; registered as exempt from xsrf checks.
pub async fn webhook_ping(State(app_state): State<AppState>, body: String) -> &'static str {
    app_state
        .comments
        .write()
        .await
        .push(format!("webhook: {}", body));
    "pong"
}

pub async fn health() -> &'static str {
    "ok"
}
