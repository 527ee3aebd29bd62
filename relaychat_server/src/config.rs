use anyhow::{Result, bail};
use relaychat_core::TokenConfigProvider;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
  pub server: ServerConfig,
  pub auth: AuthConfig,
  pub messaging: MessagingConfig,
  #[serde(default)]
  pub gateway: GatewayConfig,
  #[serde(default)]
  pub message: MessageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
  pub port: u16,
  pub db_url: String,
  #[serde(default)]
  pub cors_origin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
  pub secret: String,
  #[serde(default = "default_token_expiration_secs")]
  pub token_expiration_secs: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessagingConfig {
  pub nats: NatsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NatsConfig {
  pub url: String,
  #[serde(default = "default_nats_client_id")]
  pub client_id: String,
  #[serde(default = "default_nats_group")]
  pub group: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
  /// Sessions idle longer than this are forcibly disconnected.
  #[serde(default = "default_idle_threshold_secs")]
  pub idle_threshold_secs: u64,
  /// How often the idle scavenger runs.
  #[serde(default = "default_scavenge_interval_secs")]
  pub scavenge_interval_secs: u64,
  /// Global deadline for draining handlers on shutdown.
  #[serde(default = "default_shutdown_deadline_secs")]
  pub shutdown_deadline_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageConfig {
  #[serde(default = "default_max_message_length")]
  pub max_length: usize,
}

fn default_token_expiration_secs() -> i64 {
  24 * 60 * 60
}

fn default_nats_client_id() -> String {
  "relaychat-server".to_string()
}

fn default_nats_group() -> String {
  "relaychat".to_string()
}

fn default_idle_threshold_secs() -> u64 {
  300
}

fn default_scavenge_interval_secs() -> u64 {
  30
}

fn default_shutdown_deadline_secs() -> u64 {
  10
}

fn default_max_message_length() -> usize {
  4000
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      idle_threshold_secs: default_idle_threshold_secs(),
      scavenge_interval_secs: default_scavenge_interval_secs(),
      shutdown_deadline_secs: default_shutdown_deadline_secs(),
    }
  }
}

impl Default for MessageConfig {
  fn default() -> Self {
    Self {
      max_length: default_max_message_length(),
    }
  }
}

impl AppConfig {
  /// Read from ./relaychat.yml, /etc/config/relaychat.yml, or the file named
  /// by RELAYCHAT_CONFIG, then apply environment overrides.
  pub fn load() -> Result<Self> {
    let ret: std::result::Result<AppConfig, serde_yaml::Error> = match (
      File::open("relaychat.yml"),
      File::open("/etc/config/relaychat.yml"),
      env::var("RELAYCHAT_CONFIG"),
    ) {
      (Ok(reader), _, _) => serde_yaml::from_reader(reader),
      (_, Ok(reader), _) => serde_yaml::from_reader(reader),
      (_, _, Ok(path)) => serde_yaml::from_reader(File::open(path)?),
      _ => bail!("config file not found"),
    };

    let mut config = ret?;
    config.apply_env_overrides();
    Ok(config)
  }

  fn apply_env_overrides(&mut self) {
    if let Ok(v) = env::var("DATABASE_URL") {
      self.server.db_url = v;
    }
    if let Ok(v) = env::var("CORS_ORIGIN") {
      self.server.cors_origin = Some(v);
    }
    if let Ok(v) = env::var("NATS_URL") {
      self.messaging.nats.url = v;
    }
    if let Ok(v) = env::var("NATS_CLIENT_ID") {
      self.messaging.nats.client_id = v;
    }
    if let Ok(v) = env::var("NATS_GROUP") {
      self.messaging.nats.group = v;
    }
    if let Ok(v) = env::var("JWT_SECRET") {
      self.auth.secret = v;
    }
    if let Ok(Ok(v)) = env::var("TOKEN_EXPIRATION_SECS").map(|v| v.parse()) {
      self.auth.token_expiration_secs = v;
    }
    if let Ok(Ok(v)) = env::var("IDLE_THRESHOLD_SECS").map(|v| v.parse()) {
      self.gateway.idle_threshold_secs = v;
    }
    if let Ok(Ok(v)) = env::var("SHUTDOWN_DEADLINE_SECS").map(|v| v.parse()) {
      self.gateway.shutdown_deadline_secs = v;
    }
  }
}

impl TokenConfigProvider for AuthConfig {
  fn signing_secret(&self) -> &str {
    &self.secret
  }

  fn token_expiration_secs(&self) -> i64 {
    self.token_expiration_secs
  }
}
