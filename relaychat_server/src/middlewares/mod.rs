pub mod bearer_auth;

pub use bearer_auth::verify_token_middleware;
