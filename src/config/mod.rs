pub mod xsrf;

pub use xsrf::XsrfConfig;
