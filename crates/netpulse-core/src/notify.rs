// ── Notification dispatch ──
//
// Consumes the transition broadcast and hands each transition to every
// configured notifier. Delivery is best effort: one attempt per notifier,
// failures are logged and never retried.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use netpulse_probe::WebhookClient;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{HostStatus, StatusTransition, TransitionNotice};
use crate::registry::HostRegistry;

/// A destination for status-change notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short label used in logs and errors.
    fn name(&self) -> &str;

    async fn notify(&self, notice: &TransitionNotice) -> Result<(), CoreError>;
}

// ── Notifiers ───────────────────────────────────────────────────────

/// Writes each notice to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notice: &TransitionNotice) -> Result<(), CoreError> {
        match notice.to_status {
            HostStatus::Offline => warn!(
                host = %notice.host_id,
                occurred_at = %notice.occurred_at,
                "{}",
                notice.summary()
            ),
            _ => info!(
                host = %notice.host_id,
                occurred_at = %notice.occurred_at,
                "{}",
                notice.summary()
            ),
        }
        Ok(())
    }
}

/// POSTs each notice as JSON.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    name: String,
    client: WebhookClient,
}

impl WebhookNotifier {
    pub fn new(client: WebhookClient) -> Self {
        Self {
            name: format!("webhook {}", client.url()),
            client,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, notice: &TransitionNotice) -> Result<(), CoreError> {
        self.client
            .post(notice)
            .await
            .map_err(|e| CoreError::Notification {
                notifier: self.name.clone(),
                message: e.to_string(),
            })
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Per-transition delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationDispatcher {
    registry: Arc<HostRegistry>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<HostRegistry>) -> Self {
        Self {
            registry,
            notifiers: Vec::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Arc::new(notifier));
        self
    }

    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Build the notice, naming the host from the registry.
    ///
    /// A host removed since the transition falls back to its id.
    pub fn notice_for(&self, transition: &StatusTransition) -> TransitionNotice {
        let name = self
            .registry
            .host(&transition.host_id)
            .map_or_else(|| transition.host_id.to_string(), |h| h.name.clone());
        TransitionNotice::new(transition, name)
    }

    /// Deliver one transition to every notifier concurrently.
    pub async fn dispatch(&self, transition: &StatusTransition) -> DeliveryReport {
        let notice = self.notice_for(transition);
        let outcomes = join_all(self.notifiers.iter().map(|n| {
            let notice = &notice;
            async move { (n.name().to_owned(), n.notify(notice).await) }
        }))
        .await;

        let mut report = DeliveryReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(notifier = %name, host = %notice.host_id, error = %e, "notification failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Deliver transitions until the channel closes or `cancel` fires.
    ///
    /// On cancellation, transitions already queued are still delivered.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<Arc<StatusTransition>>,
        cancel: CancellationToken,
    ) {
        debug!(notifiers = self.notifiers.len(), "notification dispatcher started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.drain(&mut rx).await;
                    break;
                }
                recv = rx.recv() => match recv {
                    Ok(transition) => {
                        self.dispatch(&transition).await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "notification dispatcher lagged, transitions dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("notification dispatcher stopped");
    }

    async fn drain(&self, rx: &mut broadcast::Receiver<Arc<StatusTransition>>) {
        loop {
            match rx.try_recv() {
                Ok(transition) => {
                    self.dispatch(&transition).await;
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "transitions dropped during shutdown drain");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}
