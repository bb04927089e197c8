use std::io;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::journal::{Journal, JournalWriter};
use crate::model::*;

/// Append-only log of notification delivery attempts, one record per recipient.
/// Lives in its own journal, outside any reservation transaction.
pub struct AuditLog {
    journal: JournalWriter<NotificationRecord>,
    by_user: DashMap<UserId, Vec<NotificationRecord>>,
}

impl AuditLog {
    /// Replay the audit journal and start its writer. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let records: Vec<NotificationRecord> = Journal::replay(path)?;
        let journal = JournalWriter::spawn(Journal::open(path)?);
        let log = Self::with_writer(journal);
        for record in records {
            log.index(record);
        }
        Ok(log)
    }

    pub(crate) fn with_writer(journal: JournalWriter<NotificationRecord>) -> Self {
        Self {
            journal,
            by_user: DashMap::new(),
        }
    }

    fn index(&self, record: NotificationRecord) {
        self.by_user.entry(record.user_id).or_default().push(record);
    }

    /// Durably write one record. Failures are logged and counted here; callers
    /// only fold the error into their audit status.
    pub async fn record(
        &self,
        user_id: UserId,
        reservation_id: Option<ReservationId>,
        message: &str,
        status: DeliveryStatus,
    ) -> io::Result<NotificationRecord> {
        let record = NotificationRecord {
            id: Ulid::new(),
            user_id,
            reservation_id,
            message: message.to_string(),
            status,
            read: false,
            created_at: Utc::now(),
        };
        if let Err(e) = self.journal.append(record.clone()).await {
            warn!(user_id, ?reservation_id, "notification audit write failed: {e}");
            metrics::counter!(crate::observability::AUDIT_WRITE_FAILURES_TOTAL).increment(1);
            return Err(e);
        }
        self.index(record.clone());
        Ok(record)
    }

    /// Newest first.
    pub fn for_user(&self, user_id: UserId) -> Vec<NotificationRecord> {
        let mut records = self
            .by_user
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        records.reverse();
        records
    }

    pub fn unread_count(&self, user_id: UserId) -> usize {
        self.by_user
            .get(&user_id)
            .map(|e| e.iter().filter(|r| !r.read).count())
            .unwrap_or(0)
    }

    /// Drop records created before `keep_from` (UTC midnight), on disk and in the index.
    pub async fn compact(&self, keep_from: NaiveDate) -> io::Result<()> {
        let cutoff = keep_from.and_time(NaiveTime::MIN).and_utc();
        self.journal
            .compact(move |records: Vec<NotificationRecord>| {
                records.into_iter().filter(|r| r.created_at >= cutoff).collect()
            })
            .await?;
        self.by_user.retain(|_, records| {
            records.retain(|r| r.created_at >= cutoff);
            !records.is_empty()
        });
        debug!(%keep_from, "notification journal compacted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.journal");

        let first = {
            let log = AuditLog::open(&path).unwrap();
            let first = log
                .record(7, Some(1), "booked", DeliveryStatus::Delivered)
                .await
                .unwrap();
            log.record(7, Some(2), "cancelled", DeliveryStatus::Failed)
                .await
                .unwrap();
            log.record(8, None, "other user", DeliveryStatus::Delivered)
                .await
                .unwrap();
            first
        };

        let log = AuditLog::open(&path).unwrap();
        let records = log.for_user(7);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], first);
        assert_eq!(records[0].status, DeliveryStatus::Failed);
        assert!(records.iter().all(|r| !r.read));
        assert_eq!(log.unread_count(7), 2);
        assert_eq!(log.for_user(8).len(), 1);
        assert!(log.for_user(9).is_empty());
    }

    #[tokio::test]
    async fn compaction_drops_records_before_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.journal");
        let today = Utc::now().date_naive();

        {
            let log = AuditLog::open(&path).unwrap();
            log.record(7, Some(1), "booked", DeliveryStatus::Delivered)
                .await
                .unwrap();
            log.compact(today.pred_opt().unwrap()).await.unwrap();
            assert_eq!(log.for_user(7).len(), 1);

            log.compact(today.succ_opt().unwrap()).await.unwrap();
            assert!(log.for_user(7).is_empty());
            assert_eq!(log.unread_count(7), 0);
            log.record(8, None, "after", DeliveryStatus::Delivered)
                .await
                .unwrap();
        }

        let log = AuditLog::open(&path).unwrap();
        assert!(log.for_user(7).is_empty());
        assert_eq!(log.for_user(8).len(), 1);
    }

    #[tokio::test]
    async fn failed_write_is_not_indexed() {
        let log = AuditLog::with_writer(JournalWriter::closed());
        let result = log.record(1, None, "x", DeliveryStatus::Delivered).await;
        assert!(result.is_err());
        assert!(log.for_user(1).is_empty());
    }
}
