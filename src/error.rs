use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Body of every rejection produced by the xsrf stage.
pub const XSRF_ERROR_MESSAGE: &str = "xsrf token error.";

// Type alias for Result with our XsrfError
pub type Result<T> = std::result::Result<T, XsrfError>;

/// Reasons a request fails anti-forgery handling.
///
/// Every variant is a security rejection rather than a transient fault, so
/// they all collapse into the same response: HTTP 500 with
/// [`XSRF_ERROR_MESSAGE`]. The variants only exist to make logs useful.
#[derive(Error, Debug)]
pub enum XsrfError {
    #[error("xsrf cookie missing")]
    MissingCookie,

    #[error("xsrf cookie is empty")]
    EmptyCookie,

    #[error("no xsrf token submitted with the request")]
    MissingSubmittedToken,

    #[error("submitted xsrf token does not match the cookie")]
    Mismatch,

    /// The form body could not be buffered (client error or over the limit)
    #[error("failed to read form body: {0}")]
    Body(#[from] axum::Error),

    /// A handler asked for the token on a request the stage never resolved
    #[error("xsrf token was not resolved for this request")]
    TokenUnavailable,
}

impl IntoResponse for XsrfError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, XSRF_ERROR_MESSAGE).into_response()
    }
}
