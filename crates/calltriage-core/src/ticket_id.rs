//! `PREFIX-YYYYMMDD-NNN` ticket identifiers.
//!
//! Best-effort uniqueness: the next sequence is derived from the latest stored ticket
//! for the day. Concurrent calls can race to the same number; a collision is detected
//! downstream and is not fatal. Generation never fails.

use crate::store::RecordStore;
use chrono::NaiveDate;

/// Date prefix shared by every ticket created on `day`, e.g. `TKT-20261016-`.
pub fn day_prefix(prefix: &str, day: NaiveDate) -> String {
    format!("{}-{}-", prefix, day.format("%Y%m%d"))
}

/// Trailing three-digit sequence of an identifier produced by this module.
fn parse_sequence(ticket_id: &str, day_prefix: &str) -> Option<u32> {
    let tail = ticket_id.strip_prefix(day_prefix)?;
    if tail.len() != 3 || !tail.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

/// Produces the next identifier for `day`.
///
/// * prior ticket found: its sequence + 1
/// * none found, or the lookup failed: `001`
/// * prior id unparsable or sequence exhausted: last three digits of `now_ms`
///
/// `issued` is the last identifier handed out earlier in the same run; tickets whose
/// submission failed are never stored, so the store alone would repeat it.
pub fn next_ticket_id(
    store: &dyn RecordStore,
    prefix: &str,
    day: NaiveDate,
    now_ms: i64,
    issued: Option<&str>,
) -> String {
    let day_prefix = day_prefix(prefix, day);
    let stored = match store.latest_ticket_id_with_prefix(&day_prefix) {
        Ok(latest) => latest,
        Err(e) => {
            tracing::warn!(
                target: "calltriage::ticket_id",
                error = %e,
                "ticket sequence lookup failed; starting at 001"
            );
            None
        }
    };
    let issued = issued.filter(|id| id.starts_with(&day_prefix)).map(str::to_string);
    let latest = match (stored, issued) {
        (Some(stored), Some(issued)) => {
            if parse_sequence(&issued, &day_prefix) > parse_sequence(&stored, &day_prefix) {
                Some(issued)
            } else {
                Some(stored)
            }
        }
        (stored, issued) => stored.or(issued),
    };

    let Some(latest) = latest else {
        return format!("{}001", day_prefix);
    };

    match parse_sequence(&latest, &day_prefix).filter(|seq| *seq < 999) {
        Some(seq) => format!("{}{:03}", day_prefix, seq + 1),
        None => {
            let suffix = now_ms.rem_euclid(1000);
            tracing::warn!(
                target: "calltriage::ticket_id",
                latest = %latest,
                suffix = suffix,
                "could not continue ticket sequence; using timestamp suffix"
            );
            format!("{}{:03}", day_prefix, suffix)
        }
    }
}
