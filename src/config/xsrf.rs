use std::{env, str::FromStr, time::Duration};

use tracing::warn;

use crate::middleware::xsrf::{TokenDelivery, Xsrf, DEFAULT_MAX_FORM_BYTES};

/// Settings for the xsrf stage, usually read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsrfConfig {
    pub timeout: Duration,
    pub delivery: TokenDelivery,
    pub exempt_routes: Vec<String>,
    pub max_form_bytes: usize,
    pub cookie_path: Option<String>,
}

impl Default for XsrfConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            delivery: TokenDelivery::EveryRequest,
            exempt_routes: Vec::new(),
            max_form_bytes: DEFAULT_MAX_FORM_BYTES,
            cookie_path: None,
        }
    }
}

impl XsrfConfig {
    /// Read `XSRF_*` variables. Invalid values are logged and replaced by
    /// their defaults, so this never fails.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout = parse_var::<u64>("XSRF_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let delivery = match env::var("XSRF_TOKEN_DELIVERY") {
            Ok(value) => parse_delivery(&value).unwrap_or_else(|| {
                warn!(
                    "Unknown XSRF_TOKEN_DELIVERY '{}', expected 'every' or 'safe-only'",
                    value
                );
                defaults.delivery
            }),
            Err(_) => defaults.delivery,
        };

        let exempt_routes = env::var("XSRF_EXEMPT_ROUTES")
            .map(|value| parse_route_list(&value))
            .unwrap_or(defaults.exempt_routes);

        let max_form_bytes =
            parse_var::<usize>("XSRF_MAX_FORM_BYTES").unwrap_or(defaults.max_form_bytes);

        let cookie_path = env::var("XSRF_COOKIE_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty());

        XsrfConfig {
            timeout,
            delivery,
            exempt_routes,
            max_form_bytes,
            cookie_path,
        }
    }

    pub fn create_stage(&self) -> Xsrf {
        let mut xsrf = Xsrf::new(self.timeout)
            .with_delivery(self.delivery)
            .with_max_form_bytes(self.max_form_bytes);

        for route in &self.exempt_routes {
            xsrf = xsrf.with_exempt_route(route.clone());
        }
        if let Some(path) = &self.cookie_path {
            xsrf = xsrf.with_cookie_path(path.clone());
        }

        xsrf
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let value = env::var(key).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid {}='{}', using default", key, value);
            None
        }
    }
}

fn parse_delivery(value: &str) -> Option<TokenDelivery> {
    match value.trim().to_ascii_lowercase().as_str() {
        "every" | "every-request" | "all" => Some(TokenDelivery::EveryRequest),
        "safe-only" | "safe" | "get-only" => Some(TokenDelivery::SafeMethodsOnly),
        _ => None,
    }
}

fn parse_route_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|route| !route.is_empty())
        .map(String::from)
        .collect()
}
