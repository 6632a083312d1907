pub mod config;
pub mod cookie;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod token;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

pub use error::{XsrfError, XSRF_ERROR_MESSAGE};
pub use middleware::{xsrf_middleware, TokenDelivery, Xsrf};
pub use token::{generate_token, xsrf_name, XsrfFormHtml, XsrfToken, XSRF_HEADER, XSRF_TAG};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared state of the demo comment board.
#[derive(Clone, Default)]
pub struct AppState {
    pub comments: Arc<RwLock<Vec<String>>>,
}
