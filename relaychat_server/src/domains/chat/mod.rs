pub mod chat_domain;
pub mod repository;

pub use chat_domain::ChatService;
pub use repository::ChatRepository;
