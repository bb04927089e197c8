use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

use crate::model::DeliveryStatus;

#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Outbound message transport (SMS gateway or similar). Address format is opaque.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, message: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub address: String,
    pub message: String,
}

impl Dispatch {
    pub fn new(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        DeliveryOutcome::Failed { reason: reason.into() }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn status(&self) -> DeliveryStatus {
        match self {
            DeliveryOutcome::Delivered => DeliveryStatus::Delivered,
            DeliveryOutcome::Failed { .. } => DeliveryStatus::Failed,
        }
    }
}

/// Outcomes in the same order as the dispatches that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FanoutReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl FanoutReport {
    /// Aggregate success for a roster-wide announcement: partial delivery counts.
    pub fn any_delivered(&self) -> bool {
        self.outcomes.iter().any(DeliveryOutcome::is_delivered)
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }
}

/// Concurrent dispatcher with a per-dispatch deadline. Never retries.
#[derive(Clone)]
pub struct Fanout {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl Fanout {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Send every dispatch concurrently and wait for all of them.
    /// A panicking or stalled dispatch is recorded as failed without affecting the rest.
    pub async fn notify_many(&self, dispatches: Vec<Dispatch>) -> FanoutReport {
        if dispatches.is_empty() {
            return FanoutReport::default();
        }
        let started = Instant::now();
        let mut outcomes = vec![DeliveryOutcome::failed("dispatch task aborted"); dispatches.len()];

        let mut set = JoinSet::new();
        for (idx, dispatch) in dispatches.into_iter().enumerate() {
            let notifier = self.notifier.clone();
            let limit = self.timeout;
            set.spawn(async move { (idx, deliver(notifier.as_ref(), &dispatch, limit).await) });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = outcome,
                Err(e) => debug!("dispatch task failed: {e}"),
            }
        }

        let report = FanoutReport { outcomes };
        metrics::histogram!(crate::observability::FANOUT_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL, "status" => "delivered")
            .increment(report.delivered_count() as u64);
        metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL, "status" => "failed")
            .increment(report.failed_count() as u64);
        report
    }

    pub async fn notify_one(&self, dispatch: Dispatch) -> DeliveryOutcome {
        self.notify_many(vec![dispatch])
            .await
            .outcomes
            .pop()
            .unwrap_or_else(|| DeliveryOutcome::failed("no outcome"))
    }
}

async fn deliver(notifier: &dyn Notifier, dispatch: &Dispatch, limit: Duration) -> DeliveryOutcome {
    let outcome = match tokio::time::timeout(limit, notifier.send(&dispatch.address, &dispatch.message)).await {
        Ok(Ok(())) => DeliveryOutcome::Delivered,
        Ok(Err(e)) => DeliveryOutcome::failed(e.0),
        Err(_) => DeliveryOutcome::failed(format!("timed out after {}ms", limit.as_millis())),
    };
    debug!(address = %dispatch.address, ?outcome, "dispatch finished");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails for "bad:*", stalls for "slow:*", panics for "boom:*".
    #[derive(Default)]
    struct ScriptedNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for ScriptedNotifier {
        async fn send(&self, address: &str, _message: &str) -> Result<(), DeliveryError> {
            if address.starts_with("slow:") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if address.starts_with("boom:") {
                panic!("transport exploded");
            }
            if address.starts_with("bad:") {
                return Err(DeliveryError("unreachable".into()));
            }
            self.sent.lock().unwrap().push(address.to_string());
            Ok(())
        }
    }

    fn fanout(notifier: Arc<ScriptedNotifier>) -> Fanout {
        Fanout::new(notifier, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn partial_failure_still_counts_as_success() {
        let notifier = Arc::new(ScriptedNotifier::default());
        let report = fanout(notifier.clone())
            .notify_many(vec![
                Dispatch::new("bad:1", "hi"),
                Dispatch::new("ok:2", "hi"),
                Dispatch::new("bad:3", "hi"),
            ])
            .await;

        assert!(report.any_delivered());
        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.failed_count(), 2);
        assert!(report.outcomes[1].is_delivered());
        assert_eq!(report.outcomes[0], DeliveryOutcome::failed("unreachable"));
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["ok:2".to_string()]);
    }

    #[tokio::test]
    async fn all_failed_is_not_success() {
        let report = fanout(Arc::new(ScriptedNotifier::default()))
            .notify_many(vec![Dispatch::new("bad:1", "x"), Dispatch::new("bad:2", "x")])
            .await;
        assert!(!report.any_delivered());
    }

    #[tokio::test]
    async fn empty_fanout_is_not_success() {
        let report = fanout(Arc::new(ScriptedNotifier::default()))
            .notify_many(Vec::new())
            .await;
        assert!(report.outcomes.is_empty());
        assert!(!report.any_delivered());
    }

    #[tokio::test]
    async fn stalled_dispatch_times_out() {
        let started = Instant::now();
        let report = fanout(Arc::new(ScriptedNotifier::default()))
            .notify_many(vec![Dispatch::new("slow:1", "x"), Dispatch::new("ok:2", "x")])
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(report.outcomes[0], DeliveryOutcome::Failed { .. }));
        assert!(report.outcomes[1].is_delivered());
    }

    #[tokio::test]
    async fn panicking_dispatch_is_isolated() {
        let report = fanout(Arc::new(ScriptedNotifier::default()))
            .notify_many(vec![Dispatch::new("boom:1", "x"), Dispatch::new("ok:2", "x")])
            .await;
        assert_eq!(report.outcomes[0], DeliveryOutcome::failed("dispatch task aborted"));
        assert!(report.outcomes[1].is_delivered());
    }

    #[tokio::test]
    async fn notify_one_reports_single_outcome() {
        let f = fanout(Arc::new(ScriptedNotifier::default()));
        assert!(f.notify_one(Dispatch::new("ok:1", "x")).await.is_delivered());
        assert_eq!(
            f.notify_one(Dispatch::new("bad:1", "x")).await.status(),
            DeliveryStatus::Failed
        );
    }
}
