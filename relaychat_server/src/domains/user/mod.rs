pub mod repository;

pub use repository::UserRepository;
