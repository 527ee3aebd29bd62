use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use relaychat_core::{CoreError, PublishError, contracts::EventTransport};

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 5000;
const PUBLISH_TIMEOUT_MS: u64 = 5000;

/// Retry strategy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub initial_backoff_ms: u64,
  pub max_backoff_ms: u64,
  pub publish_timeout_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: MAX_RETRIES,
      initial_backoff_ms: INITIAL_BACKOFF_MS,
      max_backoff_ms: MAX_BACKOFF_MS,
      publish_timeout_ms: PUBLISH_TIMEOUT_MS,
    }
  }
}

/// At-least-once pub/sub keyed by entity id.
///
/// `publish(topic, key, record)` maps to subject `"{topic}.{key}"`; the
/// broker preserves per-subject publication order, which is exactly the
/// per-key ordering guarantee consumers rely on. `subscribe` listens on
/// `"{topic}.>"` and invokes the handler once per delivered record.
///
/// After `stop()` every further publish/subscribe fails with
/// `ShuttingDown`; consumption pauses, in-flight handlers drain, then the
/// consumer tasks close.
pub struct EventBus {
  transport: Arc<dyn EventTransport>,
  shutdown: CancellationToken,
  tracker: TaskTracker,
  retry: RetryConfig,
}

impl EventBus {
  pub fn new(transport: Arc<dyn EventTransport>, shutdown: CancellationToken) -> Self {
    Self::with_retry_config(transport, shutdown, RetryConfig::default())
  }

  pub fn with_retry_config(
    transport: Arc<dyn EventTransport>,
    shutdown: CancellationToken,
    retry: RetryConfig,
  ) -> Self {
    Self {
      transport,
      shutdown,
      tracker: TaskTracker::new(),
      retry,
    }
  }

  pub fn is_shutting_down(&self) -> bool {
    self.shutdown.is_cancelled()
  }

  /// Publish a record under `topic` with partition key `key`. Transient
  /// failures are retried with exponential backoff inside a bounded budget;
  /// a per-attempt deadline turns a hung broker call into a retryable
  /// timeout.
  pub async fn publish<T: Serialize + ?Sized>(
    &self,
    topic: &str,
    key: &str,
    record: &T,
  ) -> Result<(), CoreError> {
    if self.shutdown.is_cancelled() {
      return Err(CoreError::ShuttingDown);
    }

    let subject = format!("{topic}.{key}");
    let payload: Bytes = serde_json::to_vec(record)
      .map_err(PublishError::from)?
      .into();

    let mut attempt = 0;
    let mut backoff_ms = self.retry.initial_backoff_ms;
    let per_call = Duration::from_millis(self.retry.publish_timeout_ms);

    loop {
      attempt += 1;

      let result = match timeout(per_call, self.transport.publish(&subject, payload.clone())).await
      {
        Ok(result) => result,
        Err(_) => Err(PublishError::Timeout(format!(
          "publish to {subject} exceeded {}ms",
          self.retry.publish_timeout_ms
        ))),
      };

      match result {
        Ok(()) => return Ok(()),
        Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
          warn!(
            subject,
            attempt,
            max_retries = self.retry.max_retries,
            error = %e,
            "publish attempt failed, backing off {}ms",
            backoff_ms
          );
          sleep(Duration::from_millis(backoff_ms)).await;
          backoff_ms = std::cmp::min(backoff_ms * 2, self.retry.max_backoff_ms);

          if self.shutdown.is_cancelled() {
            return Err(CoreError::ShuttingDown);
          }
        }
        Err(e) => return Err(CoreError::Publish(e)),
      }
    }
  }

  /// Subscribe to every record of `topic`. The handler runs once per
  /// delivered record; handler failures are logged and the record is
  /// treated as processed (delivery is at-least-once, handlers must be
  /// idempotent). Malformed payloads are dropped with a warning and never
  /// reach the handler.
  pub async fn subscribe<T, F, Fut>(&self, topic: &str, handler: F) -> Result<(), CoreError>
  where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CoreError>> + Send,
  {
    if self.shutdown.is_cancelled() {
      return Err(CoreError::ShuttingDown);
    }

    let subject = format!("{topic}.>");
    let mut stream = self
      .transport
      .subscribe(&subject)
      .await
      .map_err(CoreError::Publish)?;

    let shutdown = self.shutdown.clone();
    let topic = topic.to_string();

    self.tracker.spawn(async move {
      loop {
        // Cancellation only interrupts the wait for the next record; a
        // handler that is already running completes before the loop exits.
        let maybe = tokio::select! {
          _ = shutdown.cancelled() => None,
          message = stream.next() => message,
        };

        let Some(message) = maybe else {
          break;
        };

        let record: T = match serde_json::from_slice(&message.payload) {
          Ok(record) => record,
          Err(e) => {
            warn!(topic, subject = %message.subject, error = %e, "dropping malformed record");
            continue;
          }
        };

        if let Err(e) = handler(record).await {
          warn!(topic, subject = %message.subject, error = %e,
            "handler failed; record treated as processed");
        }
      }

      info!(topic, "consumer loop stopped");
    });

    Ok(())
  }

  /// Pause consumption, drain in-flight handlers, then close.
  pub async fn stop(&self) {
    self.shutdown.cancel();
    self.tracker.close();
    self.tracker.wait().await;
    info!("event bus stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::memory::MemoryTransport;
  use serde::Deserialize;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::sync::mpsc;

  #[derive(Debug, Serialize, Deserialize, PartialEq)]
  struct TestRecord {
    value: u32,
  }

  fn bus_with(transport: Arc<MemoryTransport>) -> EventBus {
    EventBus::new(transport, CancellationToken::new())
  }

  #[tokio::test]
  async fn publish_builds_keyed_subject() {
    let transport = Arc::new(MemoryTransport::new());
    let bus = bus_with(transport.clone());

    bus
      .publish("chat.messages", "abc", &TestRecord { value: 7 })
      .await
      .unwrap();

    let published = transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "chat.messages.abc");
  }

  #[tokio::test]
  async fn subscribe_delivers_records_in_publication_order() {
    let transport = Arc::new(MemoryTransport::new());
    let bus = bus_with(transport.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    bus
      .subscribe("t", move |record: TestRecord| {
        let tx = tx.clone();
        async move {
          tx.send(record.value).unwrap();
          Ok(())
        }
      })
      .await
      .unwrap();

    for value in 1..=3 {
      bus.publish("t", "key", &TestRecord { value }).await.unwrap();
    }

    for expected in 1..=3 {
      assert_eq!(rx.recv().await, Some(expected));
    }
  }

  #[tokio::test]
  async fn malformed_records_never_reach_handlers() {
    let transport = Arc::new(MemoryTransport::new());
    let bus = bus_with(transport.clone());

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    bus
      .subscribe("t", move |_: TestRecord| {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(())
        }
      })
      .await
      .unwrap();

    transport
      .publish("t.key", Bytes::from_static(b"this is not json"))
      .await
      .unwrap();
    bus.publish("t", "key", &TestRecord { value: 1 }).await.unwrap();

    // The well-formed record still arrives after the malformed one is dropped.
    tokio::time::timeout(Duration::from_secs(1), async {
      while seen.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn handler_errors_do_not_halt_consumption() {
    let transport = Arc::new(MemoryTransport::new());
    let bus = bus_with(transport.clone());

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    bus
      .subscribe("t", move |record: TestRecord| {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          if record.value == 1 {
            Err(CoreError::Internal("boom".to_string()))
          } else {
            Ok(())
          }
        }
      })
      .await
      .unwrap();

    bus.publish("t", "k", &TestRecord { value: 1 }).await.unwrap();
    bus.publish("t", "k", &TestRecord { value: 2 }).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
      while seen.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .unwrap();
  }

  /// Transport that fails the first `fail_times` publishes.
  struct FlakyTransport {
    fail_times: usize,
    error: fn() -> PublishError,
    attempts: AtomicUsize,
  }

  impl FlakyTransport {
    fn new(fail_times: usize, error: fn() -> PublishError) -> Self {
      Self {
        fail_times,
        error,
        attempts: AtomicUsize::new(0),
      }
    }
  }

  #[async_trait::async_trait]
  impl EventTransport for FlakyTransport {
    async fn publish(&self, _subject: &str, _payload: Bytes) -> Result<(), PublishError> {
      let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
      if attempt < self.fail_times {
        Err((self.error)())
      } else {
        Ok(())
      }
    }

    async fn subscribe(
      &self,
      _subject: &str,
    ) -> Result<futures::stream::BoxStream<'static, relaychat_core::contracts::TransportMessage>, PublishError>
    {
      Ok(Box::pin(futures::stream::empty()))
    }

    fn transport_type(&self) -> &'static str {
      "flaky"
    }

    async fn is_healthy(&self) -> bool {
      true
    }
  }

  fn fast_retry() -> RetryConfig {
    RetryConfig {
      max_retries: 5,
      initial_backoff_ms: 1,
      max_backoff_ms: 4,
      publish_timeout_ms: 1000,
    }
  }

  #[tokio::test]
  async fn transient_failures_are_retried_within_the_budget() {
    let transport = Arc::new(FlakyTransport::new(3, || {
      PublishError::Network("connection reset".to_string())
    }));
    let bus =
      EventBus::with_retry_config(transport.clone(), CancellationToken::new(), fast_retry());

    bus.publish("t", "k", &TestRecord { value: 1 }).await.unwrap();
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 4, "3 failures + 1 success");
  }

  #[tokio::test]
  async fn exhausted_retry_budget_surfaces_the_transient_error() {
    let transport = Arc::new(FlakyTransport::new(usize::MAX, || {
      PublishError::Timeout("deadline".to_string())
    }));
    let bus =
      EventBus::with_retry_config(transport.clone(), CancellationToken::new(), fast_retry());

    let err = bus.publish("t", "k", &TestRecord { value: 1 }).await.unwrap_err();
    assert!(matches!(err, CoreError::Publish(PublishError::Timeout(_))));
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 5, "bounded by max_retries");
  }

  #[tokio::test]
  async fn non_retryable_errors_fail_on_first_attempt() {
    let transport = Arc::new(FlakyTransport::new(usize::MAX, || {
      PublishError::Configuration("no such stream".to_string())
    }));
    let bus =
      EventBus::with_retry_config(transport.clone(), CancellationToken::new(), fast_retry());

    let err = bus.publish("t", "k", &TestRecord { value: 1 }).await.unwrap_err();
    assert!(matches!(err, CoreError::Publish(PublishError::Configuration(_))));
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
  }

  /// Transport whose publish never completes; the per-call deadline must
  /// turn it into a retryable timeout rather than hanging the caller.
  struct HangingTransport;

  #[async_trait::async_trait]
  impl EventTransport for HangingTransport {
    async fn publish(&self, _subject: &str, _payload: Bytes) -> Result<(), PublishError> {
      futures::future::pending::<()>().await;
      unreachable!()
    }

    async fn subscribe(
      &self,
      _subject: &str,
    ) -> Result<futures::stream::BoxStream<'static, relaychat_core::contracts::TransportMessage>, PublishError>
    {
      Ok(Box::pin(futures::stream::empty()))
    }

    fn transport_type(&self) -> &'static str {
      "hanging"
    }

    async fn is_healthy(&self) -> bool {
      false
    }
  }

  #[tokio::test]
  async fn hung_publishes_hit_the_per_call_deadline() {
    let retry = RetryConfig {
      max_retries: 2,
      initial_backoff_ms: 1,
      max_backoff_ms: 2,
      publish_timeout_ms: 20,
    };
    let bus =
      EventBus::with_retry_config(Arc::new(HangingTransport), CancellationToken::new(), retry);

    let err = bus.publish("t", "k", &TestRecord { value: 1 }).await.unwrap_err();
    assert!(matches!(err, CoreError::Publish(PublishError::Timeout(_))));
  }

  #[tokio::test]
  async fn stop_rejects_further_work() {
    let transport = Arc::new(MemoryTransport::new());
    let bus = bus_with(transport.clone());

    bus.stop().await;

    let publish_err = bus
      .publish("t", "k", &TestRecord { value: 1 })
      .await
      .unwrap_err();
    assert!(matches!(publish_err, CoreError::ShuttingDown));

    let subscribe_err = bus
      .subscribe("t", |_: TestRecord| async { Ok(()) })
      .await
      .unwrap_err();
    assert!(matches!(subscribe_err, CoreError::ShuttingDown));
  }
}
