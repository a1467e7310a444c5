//! Quota decision logic: pure functions, no I/O.

/// Bytes in one megabyte as used by data limits (binary MB).
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Decide whether a port has used up its quota.
///
/// Either limit alone is enough to trigger a block; both boundaries are
/// inclusive. A limit of `None` (or `Some(0)`, which older front-ends
/// stored for "no limit") never triggers.
pub fn should_block(
    elapsed_minutes: f64,
    time_limit_minutes: Option<u64>,
    total_bytes: u64,
    data_limit_mb: Option<u64>,
) -> bool {
    let time_exceeded = time_limit_minutes
        .filter(|&limit| limit > 0)
        .is_some_and(|limit| elapsed_minutes >= limit as f64);

    let data_exceeded = data_limit_mb
        .filter(|&limit| limit > 0)
        .is_some_and(|limit| total_bytes >= limit.saturating_mul(BYTES_PER_MB));

    time_exceeded || data_exceeded
}

/// Wall-clock minutes between `added_at` and `now` (Unix seconds).
///
/// A clock that moved backwards yields 0 rather than a negative age.
pub fn elapsed_minutes(added_at: i64, now: i64) -> f64 {
    now.saturating_sub(added_at).max(0) as f64 / 60.0
}
