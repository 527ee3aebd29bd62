pub mod messaging_domain;
pub mod repository;

pub use messaging_domain::MessageService;
pub use repository::MessageRepository;
