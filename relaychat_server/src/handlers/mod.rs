pub mod auth;
pub mod chat;
pub mod health;

pub use auth::{login_handler, register_handler};
pub use chat::{create_chat_handler, list_chats_handler, list_messages_handler};
pub use health::health_handler;
