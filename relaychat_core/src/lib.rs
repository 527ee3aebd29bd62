//! Shared domain layer for the relaychat services.
//!
//! Holds the id newtypes, the persistent models with their invariants
//! (participant pairs, the delivery-status state machine), the typed error
//! kinds, the JWT token manager, and the contract traits the server wires
//! concrete implementations into.

pub mod contracts;
pub mod error;
pub mod jwt;
pub mod models;

pub use error::{CoreError, PublishError};
pub use jwt::{TokenConfigProvider, TokenManager, TokenVerifier, UserClaims};
pub use models::*;
