use crate::model::Minutes;

/// Shortest bookable window.
pub const MIN_BOOKING_MINUTES: Minutes = 60;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Upper bound on a single outbound dispatch before it counts as failed.
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 5_000;

/// Journal appends since the last compaction that trigger a new one.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1_000;

pub const DEFAULT_COMPACT_INTERVAL_SECS: u64 = 60;

/// Days of past reservations and notifications kept through compaction.
pub const DEFAULT_RETENTION_DAYS: u64 = 90;

/// Pending appends buffered in front of a journal writer task.
pub const JOURNAL_CHANNEL_CAPACITY: usize = 4096;
