use crate::error::AlertError;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Trait for outbound alert transports
pub trait Notifier: Send + Sync {
    fn notify<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;
}

/// Webhook request body: a single text field
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Notifier posting alert text to an HTTP webhook (Slack incoming webhook format)
///
/// Without a configured URL every notification is a successful no-op.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl WebhookNotifier {
    /// Create a webhook notifier
    ///
    /// # Arguments
    /// * `webhook_url` - Endpoint to post to; `None` or an empty string disables alerting
    /// * `timeout` - Upper bound for one HTTP request
    ///
    /// # Example
    /// ```
    /// use pool_watcher::alerts::WebhookNotifier;
    /// use std::time::Duration;
    ///
    /// let notifier = WebhookNotifier::new(
    ///     Some("https://hooks.slack.com/services/T000/B000/XXXX".to_string()),
    ///     Duration::from_secs(5),
    /// ).unwrap();
    /// assert!(notifier.is_enabled());
    /// ```
    pub fn new(webhook_url: Option<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, webhook_url))
    }

    /// Create a webhook notifier on top of a preconfigured HTTP client
    pub fn with_client(client: Client, webhook_url: Option<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.filter(|url| !url.trim().is_empty()),
        }
    }

    /// Create a notifier that never sends anything
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            webhook_url: None,
        }
    }

    /// Check if a webhook endpoint is configured
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

impl Notifier for WebhookNotifier {
    fn notify<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(url) = self.webhook_url.as_deref() else {
                debug!("Webhook not configured, skipping notification");
                return Ok(());
            };

            let response = self
                .client
                .post(url)
                .json(&WebhookPayload { text: message })
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AlertError::NotificationFailed(format!(
                    "webhook returned {}: {}",
                    status, body
                )));
            }

            Ok(())
        })
    }
}

/// Mock notifier for testing
///
/// Records every message it is asked to deliver and can simulate failures and slow
/// endpoints. Clones share the recorded messages.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<String>>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockNotifier {
    /// Create a mock notifier that accepts every message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock notifier that rejects every message with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Add a delay before each delivery (useful for testing timeouts)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Messages handed to the notifier so far, including rejected ones
    pub fn messages(&self) -> Vec<String> {
        self.sent_guard().clone()
    }

    /// Number of delivery attempts
    pub fn call_count(&self) -> usize {
        self.sent_guard().len()
    }

    fn sent_guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Notifier for MockNotifier {
    fn notify<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            self.sent_guard().push(message.to_string());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match &self.failure {
                Some(reason) => Err(AlertError::NotificationFailed(reason.clone())),
                None => Ok(()),
            }
        })
    }
}
