pub mod test_helpers {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, Response},
    };

    use crate::token::XSRF_TAG;

    /// GET request, optionally carrying an `_xsrf` cookie
    pub fn get_request(uri: &str, xsrf_cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = xsrf_cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", XSRF_TAG, token));
        }
        builder.body(Body::empty()).expect("request to build")
    }

    /// Form-encoded POST, optionally carrying an `_xsrf` cookie
    pub fn form_post(uri: &str, xsrf_cookie: Option<&str>, form: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(token) = xsrf_cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", XSRF_TAG, token));
        }
        builder
            .body(Body::from(form.to_string()))
            .expect("request to build")
    }

    /// Value of the `_xsrf` cookie set by a response, if any
    pub fn xsrf_cookie_value<B>(response: &Response<B>) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| axum_extra::extract::cookie::Cookie::parse(v.to_string()).ok())
            .find(|c| c.name() == XSRF_TAG)
            .map(|c| c.value().to_string())
    }

    /// Collect a response body as a string
    pub async fn body_string(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body to be readable");
        String::from_utf8(bytes.to_vec()).expect("body to be UTF-8")
    }
}
