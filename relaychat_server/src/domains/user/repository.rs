use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use relaychat_core::{
  CoreError, CreateUser, SigninUser, User, UserId, contracts,
  models::user::{hashed_password, verify_password},
};

const USER_COLUMNS: &str = "id, fullname, email, password_hash, created_at";

pub struct UserRepository {
  pool: Arc<PgPool>,
}

impl UserRepository {
  pub fn new(pool: Arc<PgPool>) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl contracts::UserRepository for UserRepository {
  async fn create(&self, input: &CreateUser) -> Result<User, CoreError> {
    if input.fullname.trim().is_empty() {
      return Err(CoreError::Validation("fullname must not be empty".to_string()));
    }

    let password_hash = hashed_password(&input.password)?;

    // Emails are matched case-insensitively; store them lowercased so the
    // unique constraint covers every spelling.
    let user = sqlx::query_as::<_, User>(&format!(
      "INSERT INTO users (fullname, email, password_hash)
       VALUES ($1, $2, $3)
       RETURNING {USER_COLUMNS}"
    ))
    .bind(&input.fullname)
    .bind(input.email.to_lowercase())
    .bind(password_hash)
    .fetch_one(&*self.pool)
    .await?;

    Ok(user)
  }

  async fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
    let user =
      sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email.to_lowercase())
        .fetch_optional(&*self.pool)
        .await?;

    Ok(user)
  }

  async fn find_by_id(&self, id: UserId) -> Result<Option<User>, CoreError> {
    let user =
      sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

    Ok(user)
  }

  async fn list_all(&self) -> Result<Vec<User>, CoreError> {
    let users = sqlx::query_as::<_, User>(&format!(
      "SELECT {USER_COLUMNS} FROM users ORDER BY fullname ASC"
    ))
    .fetch_all(&*self.pool)
    .await?;

    Ok(users)
  }

  async fn authenticate(&self, input: &SigninUser) -> Result<Option<User>, CoreError> {
    let Some(user) = self.find_by_email(&input.email).await? else {
      return Ok(None);
    };

    let Some(hash) = user.password_hash.as_deref() else {
      return Ok(None);
    };

    if verify_password(&input.password, hash)? {
      Ok(Some(user))
    } else {
      Ok(None)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::setup_test_pool;
  use relaychat_core::contracts::UserRepository as _;

  #[tokio::test]
  async fn create_and_authenticate_should_work() {
    let (_tdb, pool) = setup_test_pool().await;
    let repo = UserRepository::new(pool);

    let input = CreateUser::new("Alice Example", "Alice@Example.com", "hunter4332");
    let user = repo.create(&input).await.unwrap();
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.fullname, "Alice Example");

    // Case-insensitive lookup
    let found = repo.find_by_email("ALICE@example.COM").await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));

    let ok = repo
      .authenticate(&SigninUser::new("alice@example.com", "hunter4332"))
      .await
      .unwrap();
    assert!(ok.is_some());

    let bad = repo
      .authenticate(&SigninUser::new("alice@example.com", "wrong"))
      .await
      .unwrap();
    assert!(bad.is_none());
  }

  #[tokio::test]
  async fn duplicate_email_is_a_conflict() {
    let (_tdb, pool) = setup_test_pool().await;
    let repo = UserRepository::new(pool);

    let input = CreateUser::new("Bob", "bob@example.com", "pw-one-two");
    repo.create(&input).await.unwrap();

    let again = CreateUser::new("Bobby", "BOB@example.com", "pw-three");
    let err = repo.create(&again).await.unwrap_err();
    assert!(matches!(err, CoreError::EmailTaken(_)), "{err}");
  }
}
