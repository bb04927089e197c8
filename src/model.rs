use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since local midnight. The only time-of-day type.
pub type Minutes = u32;

pub type RoomId = u64;
pub type UserId = u64;
pub type ReservationId = u64;

/// Parse `"HH:MM"` into minutes since midnight. `"24:00"` is accepted as end of day.
pub fn parse_hhmm(s: &str) -> Option<Minutes> {
    let (h, m) = s.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: Minutes = h.parse().ok()?;
    let m: Minutes = m.parse().ok()?;
    if m >= 60 || h > 24 || (h == 24 && m != 0) {
        return None;
    }
    Some(h * 60 + m)
}

pub fn format_hhmm(minutes: Minutes) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Half-open window `[start, end)` within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Minutes,
    pub end: Minutes,
}

impl TimeWindow {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }

    /// Zero when `end` is not after `start`.
    pub fn duration_minutes(&self) -> Minutes {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_hhmm(self.start), format_hhmm(self.end))
    }
}

/// The unit of isolation: all writers of one room on one date serialize on this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey {
    pub room_id: RoomId,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(room_id: RoomId, date: NaiveDate) -> Self {
        Self { room_id, date }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room {} on {}", self.room_id, self.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// An authenticated caller, as handed over by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub display_name: String,
    pub phone: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub status: RoomStatus,
}

impl Room {
    pub fn is_available(&self) -> bool {
        self.status == RoomStatus::Available
    }
}

/// Where to reach a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: UserId,
    pub display_name: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub reason: Option<String>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn key(&self) -> DayKey {
        DayKey::new(self.room_id, self.date)
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// All reservations (any status) of one room on one date, sorted by `window.start`.
#[derive(Debug, Clone)]
pub struct DayState {
    pub key: DayKey,
    pub reservations: Vec<Reservation>,
}

impl DayState {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by window start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.window.start <= reservation.window.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose window overlaps the query, regardless of status.
    /// Everything at index >= the bound starts at or after `query.end` and can't overlap.
    pub fn overlapping(&self, query: &TimeWindow) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.window.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.window.end > query.start)
    }

    pub fn active(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_active())
    }
}

/// Journal record. One committed transaction is written as one `Vec<Event>` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    /// Set-oriented status update: every id flips to cancelled, or none does.
    ReservationsCancelled {
        room_id: RoomId,
        date: NaiveDate,
        ids: Vec<ReservationId>,
        at: DateTime<Utc>,
    },
    /// Written by compaction when it prunes old days, so their ids are never reissued.
    IdFloor {
        next_id: ReservationId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Audit record of one delivery attempt to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Ulid,
    pub user_id: UserId,
    pub reservation_id: Option<ReservationId>,
    pub message: String,
    pub status: DeliveryStatus,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ── Operation results ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationDetails {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub room_name: String,
    pub owner_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingResult {
    pub details: ReservationDetails,
    /// Roster fan-out: at least one recipient reached. Priority booking: the
    /// requester's confirmation was delivered.
    pub notified: bool,
    /// Every audit record for this booking was written.
    pub audit_recorded: bool,
    /// Reservations cancelled to make room; always empty for regular bookings.
    pub preempted: Vec<Reservation>,
}

impl BookingResult {
    pub fn reservation(&self) -> &Reservation {
        &self.details.reservation
    }

    pub fn preempted_count(&self) -> usize {
        self.preempted.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelResult {
    pub reservation: Reservation,
    pub notified: bool,
    pub audit_recorded: bool,
}
