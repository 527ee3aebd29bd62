use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::UserId;

const JWT_ISSUER: &str = "relaychat-server";
const JWT_AUDIENCE: &str = "relaychat-client";
const JWT_LEEWAY: u64 = 60;
pub const DEFAULT_TOKEN_EXPIRATION_SECS: i64 = 24 * 60 * 60;

/// Source of the signing secret and token parameters. Implemented by the
/// server's auth config section.
pub trait TokenConfigProvider {
  fn signing_secret(&self) -> &str;

  fn token_expiration_secs(&self) -> i64 {
    DEFAULT_TOKEN_EXPIRATION_SECS
  }

  fn jwt_leeway(&self) -> u64 {
    JWT_LEEWAY
  }

  fn jwt_audience(&self) -> &str {
    JWT_AUDIENCE
  }

  fn jwt_issuer(&self) -> &str {
    JWT_ISSUER
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
  sub: String, // User ID
  exp: usize,  // Expiration time (as UTC timestamp)
  iat: usize,  // Issued at (as UTC timestamp)
  aud: String, // Audience
  iss: String, // Issuer
  user: UserClaims,
}

/// The identity claims carried inside an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
  pub id: UserId,
  pub fullname: String,
  pub email: String,
}

/// Verifies bearer tokens into user claims. The gateway and the REST
/// middleware depend on this trait rather than on `TokenManager` directly.
pub trait TokenVerifier: Send + Sync {
  fn verify_token(&self, token: &str) -> Result<UserClaims, CoreError>;
}

#[derive(Clone)]
pub struct TokenManager {
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
  validation: Validation,
  expiration_secs: i64,
}

impl TokenManager {
  pub fn from_config(config: &impl TokenConfigProvider) -> Self {
    let secret = config.signing_secret().as_bytes();

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = config.jwt_leeway();
    validation.set_audience(&[config.jwt_audience()]);
    validation.set_issuer(&[config.jwt_issuer()]);

    Self {
      encoding_key: EncodingKey::from_secret(secret),
      decoding_key: DecodingKey::from_secret(secret),
      validation,
      expiration_secs: config.token_expiration_secs(),
    }
  }

  pub fn generate_token(&self, user_claims: &UserClaims) -> Result<String, CoreError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
      sub: user_claims.id.to_string(),
      exp: (now + self.expiration_secs) as usize,
      iat: now as usize,
      aud: JWT_AUDIENCE.to_string(),
      iss: JWT_ISSUER.to_string(),
      user: user_claims.clone(),
    };

    let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
    Ok(token)
  }
}

impl TokenVerifier for TokenManager {
  fn verify_token(&self, token: &str) -> Result<UserClaims, CoreError> {
    let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
    Ok(data.claims.user)
  }
}
