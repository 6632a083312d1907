use std::borrow::Cow;

use axum::http::{header, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::Cookie;
use time::{Duration, OffsetDateTime};

use crate::token::XSRF_TAG;

/// Expiry used for cookies that should never expire: 2^31 - 1 seconds after
/// the epoch (early 2038), the largest value every client understands.
pub const PERMANENT_COOKIE_EXPIRY: i64 = 2_147_483_647;

/// Build a cookie that expires `age_secs` seconds from now.
///
/// An age of zero means permanent (see [`PERMANENT_COOKIE_EXPIRY`]).
pub fn build_cookie(
    name: impl Into<Cow<'static, str>>,
    value: impl Into<Cow<'static, str>>,
    age_secs: u64,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .expires(expiry_for(age_secs, OffsetDateTime::now_utc()))
        .build()
}

fn expiry_for(age_secs: u64, now: OffsetDateTime) -> OffsetDateTime {
    let permanent = OffsetDateTime::UNIX_EPOCH + Duration::seconds(PERMANENT_COOKIE_EXPIRY);
    if age_secs == 0 {
        return permanent;
    }

    i64::try_from(age_secs)
        .ok()
        .and_then(|age| now.checked_add(Duration::seconds(age)))
        .unwrap_or(permanent)
}

/// Render a cookie as a `Set-Cookie` header value.
///
/// Returns `None` when the cookie contains bytes a header cannot carry.
pub fn set_cookie_header(cookie: &Cookie<'_>) -> Option<HeaderValue> {
    HeaderValue::from_str(&cookie.to_string()).ok()
}

/// Value of the anti-forgery cookie sent with a request, if any.
///
/// When the client sends several `_xsrf` pairs the first one wins. Clients
/// list older cookies first, so a cookie planted later by a sibling domain
/// cannot shadow the one this server issued.
pub fn read_token_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value).filter_map(|cookie| cookie.ok()))
        .find(|cookie| cookie.name() == XSRF_TAG)
        .map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_age_is_permanent() {
        let cookie = build_cookie(XSRF_TAG, "abc", 0);
        let expires = cookie.expires_datetime().unwrap();

        assert_eq!(expires.unix_timestamp(), PERMANENT_COOKIE_EXPIRY);
        assert_eq!(
            cookie.to_string(),
            "_xsrf=abc; Expires=Tue, 19 Jan 2038 03:14:07 GMT"
        );
    }

    #[test]
    fn test_age_is_added_to_now() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let cookie = build_cookie(XSRF_TAG, "abc", 1200);
        let after = OffsetDateTime::now_utc().unix_timestamp();

        let expires = cookie.expires_datetime().unwrap().unix_timestamp();
        assert!(expires >= before + 1200 && expires <= after + 1200);
    }

    #[test]
    fn test_huge_age_falls_back_to_permanent() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            expiry_for(u64::MAX, now).unix_timestamp(),
            PERMANENT_COOKIE_EXPIRY
        );
    }

    #[test]
    fn test_set_cookie_header_renders_name_value_and_expiry() {
        let cookie = build_cookie(XSRF_TAG, "token-value", 60);
        let header = set_cookie_header(&cookie).unwrap();
        let header = header.to_str().unwrap();

        assert!(header.starts_with("_xsrf=token-value; "));
        assert!(header.contains("Expires="));
        assert!(header.ends_with(" GMT"));
    }

    #[test]
    fn test_read_token_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(read_token_cookie(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("session=xyz; _xsrf=the-token"),
        );
        assert_eq!(read_token_cookie(&headers).as_deref(), Some("the-token"));
    }

    #[test]
    fn test_read_token_cookie_across_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("session=xyz"));
        headers.append(header::COOKIE, HeaderValue::from_static("_xsrf=second"));
        headers.append(header::COOKIE, HeaderValue::from_static("_xsrf=third"));

        assert_eq!(read_token_cookie(&headers).as_deref(), Some("second"));
    }

    #[test]
    fn test_read_token_cookie_keeps_first_duplicate() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("_xsrf=issued; theme=dark; _xsrf=planted"),
        );

        assert_eq!(read_token_cookie(&headers).as_deref(), Some("issued"));
    }
}
