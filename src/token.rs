use std::{convert::Infallible, fmt};

use askama::Template;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::error::XsrfError;

/// Name shared by the anti-forgery cookie, form field and query parameter.
pub const XSRF_TAG: &str = "_xsrf";

/// Header accepted as a token source for scripted (non-form) requests.
pub const XSRF_HEADER: &str = "X-XSRF-Token";

/// Returns the cookie/field name so callers never hardcode the literal.
pub fn xsrf_name() -> &'static str {
    XSRF_TAG
}

/// Anti-forgery token resolved for the current request.
///
/// The value is an opaque bearer secret. The server keeps no copy of it:
/// whatever the client holds in its `_xsrf` cookie is the source of truth.
///
/// Handlers receive it by declaring an `XsrfToken` argument; the xsrf stage
/// puts it into the request extensions before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsrfToken(String);

impl XsrfToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Short prefix that is safe to put in logs.
    pub fn redacted(&self) -> &str {
        redact(&self.0)
    }

    /// Hidden input carrying this token, ready to embed in a form.
    pub fn form_html(&self) -> XsrfFormHtml {
        XsrfFormHtml(self.clone())
    }
}

impl fmt::Display for XsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mint a fresh token (random UUID v4).
pub fn generate_token() -> XsrfToken {
    XsrfToken(Uuid::new_v4().to_string())
}

/// First 8 characters of a token, or the whole thing if it is shorter.
pub fn redact(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

#[derive(Template)]
#[template(
    source = r#"<input type="hidden" name="{{ name }}" value="{{ value }}" />"#,
    ext = "html"
)]
struct HiddenFieldTemplate<'a> {
    name: &'a str,
    value: &'a str,
}

/// Pre-rendered `<input type="hidden">` for the anti-forgery field.
///
/// Rendering goes through askama's HTML escaper, so the markup stays well
/// formed whatever the token contains. Embed it in a template with `|safe`.
#[derive(Debug, Clone)]
pub struct XsrfFormHtml(XsrfToken);

impl fmt::Display for XsrfFormHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        HiddenFieldTemplate {
            name: XSRF_TAG,
            value: self.0.as_str(),
        }
        .render_into(f)
        .map_err(|_| fmt::Error)
    }
}

impl<S> FromRequestParts<S> for XsrfToken
where
    S: Send + Sync,
{
    type Rejection = XsrfError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<XsrfToken>()
            .cloned()
            .ok_or(XsrfError::TokenUnavailable)
    }
}

impl<S> OptionalFromRequestParts<S> for XsrfToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<XsrfToken>().cloned())
    }
}
