use serde::{Deserialize, Serialize};

use argon2::{
  Argon2, PasswordHash, PasswordVerifier,
  password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};

use crate::{error::CoreError, models::User};

use super::UserId;

/// The authenticated identity attached to a request or a socket session.
/// Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
  pub id: UserId,
  pub fullname: String,
  pub email: String,
}

impl User {
  pub fn into_auth_user(self) -> AuthUser {
    AuthUser {
      id: self.id,
      fullname: self.fullname,
      email: self.email,
    }
  }
}

/// Hash a password to a PHC string ($argon2id$v=19$...).
pub fn hashed_password(password: &str) -> Result<String, CoreError> {
  let salt = SaltString::generate(OsRng);

  // Argon2 with default params (Argon2id v19)
  let argon2 = Argon2::default();

  let password_hash = argon2
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| CoreError::Internal(e.to_string()))?
    .to_string();

  Ok(password_hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, CoreError> {
  let argon2 = Argon2::default();
  let parsed_hash =
    PasswordHash::new(password_hash).map_err(|e| CoreError::Internal(e.to_string()))?;

  let is_valid = argon2
    .verify_password(password.as_bytes(), &parsed_hash)
    .is_ok();

  Ok(is_valid)
}

use crate::jwt::UserClaims;

impl From<UserClaims> for AuthUser {
  fn from(claims: UserClaims) -> Self {
    AuthUser {
      id: claims.id,
      fullname: claims.fullname,
      email: claims.email,
    }
  }
}
