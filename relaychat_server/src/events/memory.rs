use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use relaychat_core::{
  PublishError,
  contracts::{EventTransport, TransportMessage},
};

/// In-process transport for tests and broker-less local runs. Preserves
/// per-subject publication order (everything funnels through one lock).
#[derive(Default)]
pub struct MemoryTransport {
  subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<TransportMessage>)>>,
  published: Mutex<Vec<TransportMessage>>,
}

impl MemoryTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every record published so far, for assertions.
  pub fn published(&self) -> Vec<TransportMessage> {
    self.published.lock().unwrap().clone()
  }

  /// NATS-style matching: exact subject, or a pattern ending in `.>`
  /// matching any deeper subject.
  fn subject_matches(pattern: &str, subject: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix(".>") {
      subject.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'))
    } else {
      pattern == subject
    }
  }
}

#[async_trait]
impl EventTransport for MemoryTransport {
  async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError> {
    let message = TransportMessage {
      subject: subject.to_string(),
      payload,
    };

    self.published.lock().unwrap().push(message.clone());

    let mut subscribers = self.subscribers.lock().unwrap();
    subscribers.retain(|(pattern, tx)| {
      if Self::subject_matches(pattern, subject) {
        tx.send(message.clone()).is_ok()
      } else {
        !tx.is_closed()
      }
    });

    Ok(())
  }

  async fn subscribe(
    &self,
    subject: &str,
  ) -> Result<BoxStream<'static, TransportMessage>, PublishError> {
    let (tx, rx) = mpsc::unbounded_channel();
    self
      .subscribers
      .lock()
      .unwrap()
      .push((subject.to_string(), tx));

    Ok(Box::pin(UnboundedReceiverStream::new(rx)))
  }

  fn transport_type(&self) -> &'static str {
    "memory"
  }

  async fn is_healthy(&self) -> bool {
    true
  }
}
