pub mod principal;
pub mod request_id;
pub mod security_headers;

pub use principal::PRINCIPAL_HEADER;
pub use request_id::RequestIdMiddleware;
pub use security_headers::SecurityHeadersMiddleware;
