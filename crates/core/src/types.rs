/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a lock subject (device or loan). Lock state and lockout
/// bookkeeping are scoped to it.
pub type LockId = String;
