use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

use crate::journal::{Journal, JournalWriter};
use crate::model::*;

use super::conflict::{check_commit, find_conflicts};
use super::StorageError;

pub type SharedDay = Arc<RwLock<DayState>>;

/// Committed reservation state, partitioned by (room, date), backed by a journal
/// where each frame is one committed transaction.
pub struct ReservationStore {
    days: DashMap<DayKey, SharedDay>,
    /// Reverse lookup: reservation id → the day that holds it.
    index: Arc<DashMap<ReservationId, DayKey>>,
    next_id: AtomicU64,
    journal: JournalWriter<Vec<Event>>,
}

/// Apply an event to a day (no locking; caller holds the lock).
fn apply_event(day: &mut DayState, event: &Event, index: &DashMap<ReservationId, DayKey>) {
    match event {
        Event::ReservationCreated { reservation } => {
            index.insert(reservation.id, reservation.key());
            day.insert_reservation(reservation.clone());
        }
        Event::ReservationsCancelled { ids, at, .. } => {
            for id in ids {
                if let Some(r) = day.get_mut(*id) {
                    r.status = ReservationStatus::Cancelled;
                    r.updated_at = *at;
                }
            }
        }
        Event::IdFloor { .. } => {}
    }
}

fn event_key(event: &Event) -> Option<DayKey> {
    match event {
        Event::ReservationCreated { reservation } => Some(reservation.key()),
        Event::ReservationsCancelled { room_id, date, .. } => Some(DayKey::new(*room_id, *date)),
        Event::IdFloor { .. } => None,
    }
}

/// Fold a journal history into one creation frame per surviving reservation,
/// ordered by id. Cancelled reservations keep their status. Days before
/// `keep_from` are dropped; a leading `IdFloor` frame preserves the id sequence
/// whenever the surviving rows alone would understate it.
fn compact_frames(frames: Vec<Vec<Event>>, keep_from: NaiveDate) -> Vec<Vec<Event>> {
    let mut latest: BTreeMap<ReservationId, Reservation> = BTreeMap::new();
    let mut next_id: ReservationId = 0;
    for event in frames.into_iter().flatten() {
        match event {
            Event::ReservationCreated { reservation } => {
                next_id = next_id.max(reservation.id + 1);
                latest.insert(reservation.id, reservation);
            }
            Event::IdFloor { next_id: floor } => next_id = next_id.max(floor),
            Event::ReservationsCancelled { ids, at, .. } => {
                for id in ids {
                    if let Some(r) = latest.get_mut(&id) {
                        r.status = ReservationStatus::Cancelled;
                        r.updated_at = at;
                    }
                }
            }
        }
    }
    latest.retain(|_, r| r.date >= keep_from);
    let kept_next = latest.last_key_value().map_or(0, |(id, _)| id + 1);
    let floor = (next_id > kept_next).then(|| vec![Event::IdFloor { next_id }]);
    floor
        .into_iter()
        .chain(
            latest
                .into_values()
                .map(|reservation| vec![Event::ReservationCreated { reservation }]),
        )
        .collect()
}

impl ReservationStore {
    /// Replay the journal at `path` and start its writer. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let frames: Vec<Vec<Event>> = Journal::replay(path)?;
        let store = Self::with_writer(JournalWriter::spawn(Journal::open(path)?));
        for event in frames.iter().flatten() {
            store.replay_event(event);
        }
        Ok(store)
    }

    pub(crate) fn with_writer(journal: JournalWriter<Vec<Event>>) -> Self {
        Self {
            days: DashMap::new(),
            index: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            journal,
        }
    }

    /// We're the sole owner of every day lock during replay, so `try_write`
    /// always succeeds instantly. Never block here: this may run inside an async context.
    fn replay_event(&self, event: &Event) {
        match event {
            Event::ReservationCreated { reservation } => {
                self.next_id.fetch_max(reservation.id + 1, Ordering::SeqCst);
            }
            Event::IdFloor { next_id } => {
                self.next_id.fetch_max(*next_id, Ordering::SeqCst);
            }
            Event::ReservationsCancelled { .. } => {}
        }
        let Some(key) = event_key(event) else {
            return;
        };
        let day = self.day(key);
        let mut guard = day.try_write().expect("replay: uncontended write");
        apply_event(&mut guard, event, &self.index);
    }

    fn day(&self, key: DayKey) -> SharedDay {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key))))
            .value()
            .clone()
    }

    pub fn get_day(&self, key: &DayKey) -> Option<SharedDay> {
        self.days.get(key).map(|e| e.value().clone())
    }

    pub fn key_for(&self, id: ReservationId) -> Option<DayKey> {
        self.index.get(&id).map(|e| *e.value())
    }

    /// Next id from the sequence. Ids burned by rolled-back transactions are not reused.
    pub fn allocate_id(&self) -> ReservationId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Open a write transaction on one (room, date). The lock is held until the
    /// transaction is committed or dropped.
    pub async fn begin(&self, key: DayKey) -> DayTxn<'_> {
        let guard = self.day(key).write_owned().await;
        DayTxn {
            store: self,
            staged: Staged {
                key: guard.key,
                events: Vec::new(),
            },
            guard,
        }
    }

    /// Open a write transaction on the day that holds `id`, if the id is known.
    pub async fn begin_for(&self, id: ReservationId) -> Option<DayTxn<'_>> {
        let key = self.key_for(id)?;
        Some(self.begin(key).await)
    }

    /// Committed state of one day.
    pub async fn snapshot(&self, key: &DayKey) -> Option<DayState> {
        let day = self.get_day(key)?;
        let guard = day.read().await;
        Some(guard.clone())
    }

    pub async fn get(&self, id: ReservationId) -> Option<Reservation> {
        let day = self.get_day(&self.key_for(id)?)?;
        let guard = day.read().await;
        guard.get(id).cloned()
    }

    /// Every committed reservation, ordered by date, room, then start time.
    pub async fn all_reservations(&self) -> Vec<Reservation> {
        let mut days: Vec<(DayKey, SharedDay)> = self
            .days
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        days.sort_by_key(|(key, _)| (key.date, key.room_id));

        let mut all = Vec::new();
        for (_, day) in days {
            let guard = day.read().await;
            all.extend(guard.reservations.iter().cloned());
        }
        all
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }

    /// Rewrite the journal as one creation frame per reservation, then forget
    /// every day before `keep_from`, on disk and in memory.
    pub async fn compact(&self, keep_from: NaiveDate) -> Result<(), StorageError> {
        let result = self
            .journal
            .compact(move |frames| compact_frames(frames, keep_from))
            .await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(crate::observability::COMPACTIONS_TOTAL, "status" => status).increment(1);
        result?;
        self.prune_before(keep_from).await;
        Ok(())
    }

    async fn prune_before(&self, keep_from: NaiveDate) {
        let stale: Vec<DayKey> = self
            .days
            .iter()
            .map(|e| *e.key())
            .filter(|key| key.date < keep_from)
            .collect();
        for key in stale {
            let Some(day) = self.get_day(&key) else {
                continue;
            };
            let guard = day.write().await;
            self.days.remove(&key);
            for r in &guard.reservations {
                self.index.remove(&r.id);
            }
            debug!(%key, reservations = guard.reservations.len(), "day pruned");
        }
    }
}

/// Write transaction over one (room, date).
///
/// Reads see the committed state under the held lock. Writes are staged and
/// become visible only on `commit`, which journals them as one frame and then
/// applies them. Dropping the transaction without committing rolls it back.
pub struct DayTxn<'a> {
    store: &'a ReservationStore,
    guard: OwnedRwLockWriteGuard<DayState>,
    staged: Staged,
}

/// Events staged by a transaction that has not committed yet.
struct Staged {
    key: DayKey,
    events: Vec<Event>,
}

impl Drop for Staged {
    fn drop(&mut self) {
        if !self.events.is_empty() {
            debug!(key = %self.key, staged = self.events.len(), "transaction rolled back");
        }
    }
}

impl DayTxn<'_> {
    pub fn key(&self) -> DayKey {
        self.guard.key
    }

    /// Re-read a row under the transaction's lock.
    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.guard.get(id)
    }

    pub fn find_conflicts(&self, window: &TimeWindow, exclude: Option<ReservationId>) -> Vec<Reservation> {
        find_conflicts(&self.guard, window, exclude)
    }

    pub fn insert(&mut self, reservation: Reservation) {
        debug_assert_eq!(reservation.key(), self.key());
        self.staged.events.push(Event::ReservationCreated { reservation });
    }

    /// Cancel every id in one set-oriented update.
    pub fn cancel_all(&mut self, ids: Vec<ReservationId>, at: DateTime<Utc>) {
        if ids.is_empty() {
            return;
        }
        let key = self.key();
        self.staged.events.push(Event::ReservationsCancelled {
            room_id: key.room_id,
            date: key.date,
            ids,
            at,
        });
    }

    /// Journal the staged events as one frame, then apply them.
    ///
    /// Once the overlap check passes, the write and the apply run on their own
    /// task that owns the day lock, so they finish together even if the caller
    /// stops waiting.
    pub async fn commit(self) -> Result<(), StorageError> {
        let DayTxn {
            store,
            mut guard,
            mut staged,
        } = self;
        let events = std::mem::take(&mut staged.events);
        if events.is_empty() {
            return Ok(());
        }
        check_commit(&guard, &events)?;

        let journal = store.journal.clone();
        let index = store.index.clone();
        let applied = tokio::spawn(async move {
            journal.append(events.clone()).await?;
            for event in &events {
                apply_event(&mut guard, event, &index);
            }
            Ok::<(), io::Error>(())
        });
        match applied.await {
            Ok(result) => result.map_err(StorageError::from),
            Err(e) => Err(StorageError::Journal(io::Error::other(e))),
        }
    }
}
