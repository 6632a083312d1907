use std::{collections::HashSet, sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    extract::{MatchedPath, Request, State},
    http::{header, HeaderMap, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use axum_extra::extract::cookie::Cookie;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::{
    cookie::{build_cookie, read_token_cookie, set_cookie_header},
    error::{Result, XsrfError},
    token::{generate_token, redact, XsrfToken, XSRF_HEADER, XSRF_TAG},
};

/// Largest form body buffered while looking for the submitted token.
pub const DEFAULT_MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// Which requests get the resolved token handed to their handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenDelivery {
    /// Safe and unsafe requests alike, so a rejected POST can re-render its form
    #[default]
    EveryRequest,
    SafeMethodsOnly,
}

/// How the stage treats a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    OptedOut,
    SafeMethodIssue,
    SafeMethodReuse,
    UnsafeMethodValidate,
}

impl RequestState {
    fn resolve(checked: bool, safe: bool, cookie_issued: bool) -> Self {
        match (checked, safe, cookie_issued) {
            (false, _, _) => RequestState::OptedOut,
            (true, false, _) => RequestState::UnsafeMethodValidate,
            (true, true, true) => RequestState::SafeMethodIssue,
            (true, true, false) => RequestState::SafeMethodReuse,
        }
    }
}

/// Double-submit cookie protection for an axum router.
///
/// Every routed request gets an anti-forgery token, read from the `_xsrf`
/// cookie or minted (and sent back with `Set-Cookie`) when the cookie is
/// missing. Unsafe methods must echo the cookie value in the `_xsrf` form
/// field; anything else is rejected with HTTP 500 before the handler runs.
///
/// The settings are fixed once the stage is mounted and shared read-only by
/// every request.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use axum::{routing::get, Router};
/// use xsrf_guard::middleware::Xsrf;
///
/// let app: Router = Xsrf::new(Duration::from_secs(20 * 60))
///     .with_exempt_route("/webhooks/{id}")
///     .protect(Router::new().route("/", get(|| async { "hello" })));
/// ```
#[derive(Debug, Clone)]
pub struct Xsrf {
    timeout: Duration,
    delivery: TokenDelivery,
    exempt_routes: HashSet<String>,
    max_form_bytes: usize,
    cookie_path: Option<String>,
}

impl Xsrf {
    /// `timeout` is the cookie lifetime; zero makes the cookie permanent.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            delivery: TokenDelivery::default(),
            exempt_routes: HashSet::new(),
            max_form_bytes: DEFAULT_MAX_FORM_BYTES,
            cookie_path: None,
        }
    }

    /// Opt a route out of token handling. `route` is the pattern the route
    /// was registered with, e.g. `/webhooks/{id}`.
    pub fn with_exempt_route(mut self, route: impl Into<String>) -> Self {
        self.exempt_routes.insert(route.into());
        self
    }

    pub fn with_delivery(mut self, delivery: TokenDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_max_form_bytes(mut self, max_form_bytes: usize) -> Self {
        self.max_form_bytes = max_form_bytes;
        self
    }

    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn delivery(&self) -> TokenDelivery {
        self.delivery
    }

    pub fn max_form_bytes(&self) -> usize {
        self.max_form_bytes
    }

    /// Should requests routed to `route` be checked? Defaults to yes.
    pub fn check_xsrf(&self, route: &str) -> bool {
        !self.exempt_routes.contains(route)
    }

    /// Mount the stage in front of the routes `router` has so far.
    ///
    /// Call this after every route is registered. It uses `route_layer`, so
    /// routes added to the returned router later are not protected, and
    /// requests that match no route fall through to the fallback without
    /// touching cookies or tokens.
    pub fn protect<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(
            Arc::new(self),
            xsrf_middleware,
        ))
    }

    fn issue_cookie(&self, token: &XsrfToken) -> Cookie<'static> {
        let mut cookie = build_cookie(XSRF_TAG, token.as_str().to_owned(), self.timeout.as_secs());
        if let Some(path) = &self.cookie_path {
            cookie.set_path(path.clone());
        }
        cookie
    }

    async fn validate(&self, request: Request, cookie_token: Option<&str>) -> Result<Request> {
        let (request, submitted) = self.submitted_token(request).await?;
        validate_tokens(cookie_token, submitted.as_deref())?;
        Ok(request)
    }

    /// Token sent back by the client: form body first, then the query
    /// string, then the `X-XSRF-Token` header. A buffered body is handed
    /// back inside the returned request so the handler can still read it.
    async fn submitted_token(&self, request: Request) -> Result<(Request, Option<String>)> {
        let (parts, body) = request.into_parts();

        let (body, from_form) = if is_form_encoded(&parts.headers) {
            let bytes = to_bytes(body, self.max_form_bytes).await?;
            let token = form_value(&bytes);
            (Body::from(bytes), token)
        } else {
            (body, None)
        };

        let submitted = from_form
            .or_else(|| parts.uri.query().and_then(|q| form_value(q.as_bytes())))
            .or_else(|| {
                parts
                    .headers
                    .get(XSRF_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        Ok((Request::from_parts(parts, body), submitted))
    }
}

/// Safe methods are never validated; they are assumed not to change state.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Compare the cookie token against the submitted one.
///
/// Passes only when the cookie is present, non-empty and byte-for-byte equal
/// to the submitted value. The comparison runs in constant time.
pub fn validate_tokens(cookie_token: Option<&str>, submitted_token: Option<&str>) -> Result<()> {
    let cookie_token = cookie_token.ok_or(XsrfError::MissingCookie)?;
    if cookie_token.is_empty() {
        return Err(XsrfError::EmptyCookie);
    }
    let submitted_token = submitted_token.ok_or(XsrfError::MissingSubmittedToken)?;

    if bool::from(cookie_token.as_bytes().ct_eq(submitted_token.as_bytes())) {
        Ok(())
    } else {
        Err(XsrfError::Mismatch)
    }
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            ct.trim()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

fn form_value(input: &[u8]) -> Option<String> {
    form_urlencoded::parse(input)
        .find(|(key, _)| key == XSRF_TAG)
        .map(|(_, value)| value.into_owned())
}

/// The xsrf stage as an axum middleware function.
///
/// Mount it with `route_layer` (see [`Xsrf::protect`]): the stage relies on
/// the route match to tell routed requests from unroutable ones.
pub async fn xsrf_middleware(
    State(xsrf): State<Arc<Xsrf>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(route) = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
    else {
        debug!("No matched route for {}, skipping xsrf", request.uri().path());
        return next.run(request).await;
    };

    if !xsrf.check_xsrf(&route) {
        debug!(
            "{:?}: route {} skips xsrf",
            RequestState::resolve(false, is_safe_method(request.method()), false),
            route
        );
        return next.run(request).await;
    }

    let method = request.method().clone();
    let safe = is_safe_method(&method);
    let cookie_token = read_token_cookie(request.headers());

    let (token, issued) = match cookie_token.as_deref().filter(|v| !v.is_empty()) {
        Some(existing) => (XsrfToken::new(existing), None),
        None => {
            let token = generate_token();
            let cookie = xsrf.issue_cookie(&token);
            (token, Some(cookie))
        }
    };

    debug!(
        "{:?} for {} {}: xsrf token {}",
        RequestState::resolve(true, safe, issued.is_some()),
        method,
        route,
        token.redacted()
    );

    if safe || xsrf.delivery == TokenDelivery::EveryRequest {
        request.extensions_mut().insert(token);
    }

    let outcome = if safe {
        Ok(request)
    } else {
        xsrf.validate(request, cookie_token.as_deref()).await
    };

    let mut response = match outcome {
        Ok(request) => next.run(request).await,
        Err(err) => {
            warn!(
                "Rejecting {} {}: {} (cookie {})",
                method,
                route,
                err,
                cookie_token.as_deref().map(redact).unwrap_or("<none>")
            );
            err.into_response()
        }
    };

    if let Some(cookie) = issued {
        match set_cookie_header(&cookie) {
            Some(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            None => warn!("Could not encode xsrf cookie for {} {}", method, route),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tokens_accepts_matching_pair() {
        assert!(validate_tokens(Some("abc-123"), Some("abc-123")).is_ok());
    }

    #[test]
    fn test_validate_tokens_rejections() {
        assert!(matches!(
            validate_tokens(None, Some("abc")),
            Err(XsrfError::MissingCookie)
        ));
        assert!(matches!(
            validate_tokens(Some(""), Some("")),
            Err(XsrfError::EmptyCookie)
        ));
        assert!(matches!(
            validate_tokens(Some("abc"), None),
            Err(XsrfError::MissingSubmittedToken)
        ));
        assert!(matches!(
            validate_tokens(Some("abc"), Some("abd")),
            Err(XsrfError::Mismatch)
        ));
        assert!(matches!(
            validate_tokens(Some("abc"), Some("abc-longer")),
            Err(XsrfError::Mismatch)
        ));
    }

    #[test]
    fn test_method_classes() {
        for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE] {
            assert!(is_safe_method(&method), "{} should be safe", method);
        }
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(!is_safe_method(&method), "{} should be validated", method);
        }
    }

    #[test]
    fn test_request_state_resolution() {
        assert_eq!(
            RequestState::resolve(true, true, true),
            RequestState::SafeMethodIssue
        );
        assert_eq!(
            RequestState::resolve(true, true, false),
            RequestState::SafeMethodReuse
        );
        assert_eq!(
            RequestState::resolve(true, false, true),
            RequestState::UnsafeMethodValidate
        );
        assert_eq!(
            RequestState::resolve(false, false, true),
            RequestState::OptedOut
        );
        assert_eq!(
            RequestState::resolve(false, true, false),
            RequestState::OptedOut
        );
    }

    #[tokio::test]
    async fn test_routes_added_after_protect_are_not_covered() {
        use axum::{http::StatusCode, routing::post};
        use tower::ServiceExt;

        let app: Router = Xsrf::new(Duration::ZERO)
            .protect(Router::new().route("/early", post(|| async { "early" })))
            .route("/late", post(|| async { "late" }));

        let unprotected_post = |uri: &str| {
            axum::http::Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(unprotected_post("/early"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = app.oneshot(unprotected_post("/late")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[test]
    fn test_exempt_routes_opt_out() {
        let xsrf = Xsrf::new(Duration::ZERO).with_exempt_route("/webhooks/{id}");

        assert!(!xsrf.check_xsrf("/webhooks/{id}"));
        assert!(xsrf.check_xsrf("/webhooks/42"));
        assert!(xsrf.check_xsrf("/"));
    }

    #[test]
    fn test_form_value_takes_first_field() {
        assert_eq!(
            form_value(b"body=hi&_xsrf=first&_xsrf=second").as_deref(),
            Some("first")
        );
        assert_eq!(form_value(b"_xsrf=a%2Bb").as_deref(), Some("a+b"));
        assert_eq!(form_value(b"body=hi"), None);
    }

    #[test]
    fn test_form_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_form_encoded(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=UTF-8"
                .parse()
                .unwrap(),
        );
        assert!(is_form_encoded(&headers));

        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(!is_form_encoded(&headers));
    }

    #[test]
    fn test_issued_cookie_honours_path_and_timeout() {
        let token = XsrfToken::new("t");
        let cookie = Xsrf::new(Duration::ZERO)
            .with_cookie_path("/")
            .issue_cookie(&token);

        assert_eq!(cookie.name(), XSRF_TAG);
        assert_eq!(cookie.value(), "t");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(
            cookie.expires_datetime().unwrap().unix_timestamp(),
            crate::cookie::PERMANENT_COOKIE_EXPIRY
        );
    }
}
