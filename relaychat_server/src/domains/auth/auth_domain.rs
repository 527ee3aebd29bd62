use serde::Serialize;
use std::sync::Arc;

use relaychat_core::{
  AuthUser, CoreError, CreateUser, SigninUser, TokenManager, TokenVerifier, User, UserClaims,
  contracts::UserRepository,
};

/// Result of a successful register/login: the bearer token plus the user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
  pub access_token: String,
  pub user: User,
}

/// Registration and login, issuing signed access tokens.
pub struct AuthService {
  users: Arc<dyn UserRepository>,
  token_manager: Arc<TokenManager>,
}

impl AuthService {
  pub fn new(users: Arc<dyn UserRepository>, token_manager: Arc<TokenManager>) -> Self {
    Self {
      users,
      token_manager,
    }
  }

  pub async fn register(&self, input: &CreateUser) -> Result<AuthTokens, CoreError> {
    let user = self.users.create(input).await?;
    self.issue(user)
  }

  pub async fn login(&self, input: &SigninUser) -> Result<AuthTokens, CoreError> {
    let user = self
      .users
      .authenticate(input)
      .await?
      .ok_or_else(|| CoreError::Authentication("invalid email or password".to_string()))?;
    self.issue(user)
  }

  fn issue(&self, user: User) -> Result<AuthTokens, CoreError> {
    let claims = UserClaims {
      id: user.id,
      fullname: user.fullname.clone(),
      email: user.email.clone(),
    };
    let access_token = self.token_manager.generate_token(&claims)?;
    Ok(AuthTokens { access_token, user })
  }
}

/// Verifies bearer tokens on session handshake and resolves the user.
///
/// Stateless: token parsing is delegated to the injected verifier, user
/// resolution to the user repository.
pub struct Authenticator {
  verifier: Arc<dyn TokenVerifier>,
  users: Arc<dyn UserRepository>,
}

impl Authenticator {
  pub fn new(verifier: Arc<dyn TokenVerifier>, users: Arc<dyn UserRepository>) -> Self {
    Self { verifier, users }
  }

  /// `token` straight from the handshake; `None` when no credential was
  /// presented at all.
  pub async fn authenticate(&self, token: Option<&str>) -> Result<AuthUser, CoreError> {
    let token =
      token.ok_or_else(|| CoreError::Authentication("no token provided".to_string()))?;

    let claims = self.verifier.verify_token(token)?;

    let user = self
      .users
      .find_by_id(claims.id)
      .await?
      .ok_or_else(|| CoreError::UserNotFound(format!("user {} not found", claims.id)))?;

    Ok(user.into_auth_user())
  }
}
