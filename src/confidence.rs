use rusqlite::Connection;

use crate::error::Result;

/// Score assigned to an exact pricing match.
pub const PERFECT_SCORE: i64 = 100;

/// Score assigned when scholarship indicators exist but no award is on file.
pub const MISSING_RECORD_SCORE: i64 = 30;

/// Map a variance percentage to a 0-100 confidence score. Used by the
/// tolerance and scholarship tiers alike: the closer the observed amount sits
/// to the evidence, the higher the confidence.
pub fn score_variance(variance_pct: f64) -> i64 {
    if variance_pct <= 1.0 {
        95
    } else if variance_pct <= 5.0 {
        80
    } else if variance_pct <= 10.0 {
        60
    } else {
        40
    }
}

/// Append one entry to a status's confidence history. The log is append-only;
/// rows are never edited or deleted.
pub fn record_change(
    conn: &Connection,
    status_id: i64,
    old_score: Option<i64>,
    new_score: Option<i64>,
    method: &str,
    reason: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO confidence_history (status_id, old_score, new_score, method, reason) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![status_id, old_score, new_score, method, reason],
    )?;
    Ok(())
}
