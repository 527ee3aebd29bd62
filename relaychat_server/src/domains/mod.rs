pub mod auth;
pub mod chat;
pub mod messaging;
pub mod user;
