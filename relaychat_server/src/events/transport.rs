use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{error, info, warn};

use relaychat_core::{
  PublishError,
  contracts::{EventTransport, TransportMessage},
};

const MAX_CONNECT_RETRIES: u32 = 5;
const CONNECT_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// NATS-backed transport.
///
/// The client reconnects on its own with exponential backoff and re-delivers
/// to existing subscriptions after reconnect; this wrapper only has to get
/// the first connection established.
pub struct NatsTransport {
  client: async_nats::Client,
}

impl NatsTransport {
  pub async fn connect_with_retry(url: &str, client_name: &str) -> Result<Self, PublishError> {
    let mut retries = 0;

    loop {
      info!(url, "connecting to NATS");

      // ConnectOptions does not implement Clone, so recreate each attempt.
      let connect_options = async_nats::ConnectOptions::new()
        .name(client_name)
        .connection_timeout(std::time::Duration::from_secs(10))
        .ping_interval(std::time::Duration::from_secs(30))
        .reconnect_delay_callback(|attempts: usize| {
          std::time::Duration::from_secs(std::cmp::min(
            2u64.saturating_pow(attempts as u32),
            30,
          ))
        });

      match connect_options.connect(url).await {
        Ok(client) => {
          info!(url, "connected to NATS");
          return Ok(Self { client });
        }
        Err(e) => {
          retries += 1;
          if retries >= MAX_CONNECT_RETRIES {
            error!(url, error = %e, "failed to connect to NATS after {} retries", MAX_CONNECT_RETRIES);
            return Err(PublishError::Network(e.to_string()));
          }
          warn!(
            url,
            attempt = retries,
            error = %e,
            "NATS connect failed, retrying in {:?}",
            CONNECT_RETRY_DELAY
          );
          tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        }
      }
    }
  }

  pub fn client(&self) -> &async_nats::Client {
    &self.client
  }
}

#[async_trait]
impl EventTransport for NatsTransport {
  async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError> {
    self
      .client
      .publish(subject.to_string(), payload)
      .await
      .map_err(|e| PublishError::Network(e.to_string()))?;

    // publish() only enqueues; flush so the record is on the wire before the
    // caller reports success.
    self
      .client
      .flush()
      .await
      .map_err(|e| PublishError::Network(e.to_string()))?;

    Ok(())
  }

  async fn subscribe(
    &self,
    subject: &str,
  ) -> Result<BoxStream<'static, TransportMessage>, PublishError> {
    info!(subject, "subscribing to NATS subject");

    let subscriber = self
      .client
      .subscribe(subject.to_string())
      .await
      .map_err(|e| PublishError::Network(e.to_string()))?;

    let stream = subscriber
      .map(|msg| TransportMessage {
        subject: msg.subject.to_string(),
        payload: msg.payload,
      })
      .boxed();

    Ok(stream)
  }

  fn transport_type(&self) -> &'static str {
    "nats"
  }

  async fn is_healthy(&self) -> bool {
    self.client.connection_state() == async_nats::connection::State::Connected
  }
}
