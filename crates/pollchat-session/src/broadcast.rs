//! Fan-out of one message to every online peer.

use std::sync::Arc;

use futures::future::join_all;
use pollchat_core::{ChatError, RemoteService};
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinHandle};
use uuid::Uuid;

/// Result of one per-recipient attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Attempt {
    Delivered,
    Rejected,
    Failed(ChatError),
}

/// Aggregated outcome of a broadcast, for logging and metrics only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub id: Uuid,
    pub attempted: usize,
    pub delivered: Vec<String>,
    /// `(recipient, reason)` pairs.
    pub failed: Vec<(String, String)>,
}

/// Handle to a dispatched broadcast.
///
/// Dropping it does not cancel any send.
#[derive(Debug)]
pub struct BroadcastHandle {
    id: Uuid,
    targets: Vec<String>,
    report: JoinHandle<BroadcastReport>,
}

impl BroadcastHandle {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Recipients an attempt was issued for.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Wait for every attempt to finish.
    pub async fn report(self) -> BroadcastReport {
        match self.report.await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(broadcast = %self.id, "broadcast supervisor failed: {e}");
                BroadcastReport {
                    id: self.id,
                    attempted: self.targets.len(),
                    ..BroadcastReport::default()
                }
            }
        }
    }
}

/// Issues one send per target with bounded concurrency.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    limit: Arc<Semaphore>,
}

impl BroadcastDispatcher {
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            limit: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Start sending `body` to each target and return immediately.
    ///
    /// Each attempt runs in its own task; a failure for one target never
    /// affects the others. There are no retries.
    pub fn dispatch(
        &self,
        service: Arc<dyn RemoteService>,
        token: &str,
        body: &str,
        targets: Vec<String>,
    ) -> BroadcastHandle {
        let id = Uuid::new_v4();
        let token: Arc<str> = Arc::from(token);
        let body: Arc<str> = Arc::from(body);

        let sends: Vec<JoinHandle<(String, Attempt)>> = targets
            .iter()
            .cloned()
            .map(|target| {
                let service = Arc::clone(&service);
                let limit = Arc::clone(&self.limit);
                let token = Arc::clone(&token);
                let body = Arc::clone(&body);
                tokio::spawn(async move {
                    let _permit = limit.acquire_owned().await.ok();
                    let attempt = match service.send(&token, &target, &body).await {
                        Ok(true) => Attempt::Delivered,
                        Ok(false) => Attempt::Rejected,
                        Err(e) => Attempt::Failed(e),
                    };
                    match &attempt {
                        Attempt::Delivered => {
                            tracing::debug!(broadcast = %id, %target, "broadcast delivered");
                        }
                        Attempt::Rejected => {
                            tracing::warn!(broadcast = %id, %target, "broadcast rejected by server");
                        }
                        Attempt::Failed(e) => {
                            tracing::warn!(broadcast = %id, %target, "broadcast send failed: {e}");
                        }
                    }
                    (target, attempt)
                })
            })
            .collect();

        let attempted = sends.len();
        let report = tokio::spawn(async move {
            let mut report = BroadcastReport {
                id,
                attempted,
                ..BroadcastReport::default()
            };
            for result in join_all(sends).await {
                match result {
                    Ok((target, Attempt::Delivered)) => report.delivered.push(target),
                    Ok((target, Attempt::Rejected)) => {
                        report.failed.push((target, "rejected by server".to_owned()));
                    }
                    Ok((target, Attempt::Failed(e))) => report.failed.push((target, e.to_string())),
                    Err(e) => report.failed.push(("<unknown>".to_owned(), e.to_string())),
                }
            }
            tracing::info!(
                broadcast = %id,
                attempted,
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "broadcast finished"
            );
            report
        });

        BroadcastHandle {
            id,
            targets,
            report,
        }
    }
}
