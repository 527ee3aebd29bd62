pub mod auth_domain;

pub use auth_domain::{AuthService, AuthTokens, Authenticator};
