pub mod xsrf;

pub use xsrf::{
    is_safe_method, validate_tokens, xsrf_middleware, RequestState, TokenDelivery, Xsrf,
    DEFAULT_MAX_FORM_BYTES,
};
