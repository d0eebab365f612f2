use rusqlite::{Connection, OptionalExtension};

use crate::engine::GOOD_MATCH_TOLERANCE_PCT;
use crate::error::{BursarError, Result};
use crate::fmt::round_cents;
use crate::models::{Adjustment, AdjustmentType, MatchResult, Payment};
use crate::thresholds;

fn map_adjustment(row: &rusqlite::Row) -> rusqlite::Result<Adjustment> {
    let requires_approval: i64 = row.get(10)?;
    Ok(Adjustment {
        id: row.get(0)?,
        adjustment_type: row.get(1)?,
        description: row.get(2)?,
        original_amount: row.get(3)?,
        adjusted_amount: row.get(4)?,
        variance: row.get(5)?,
        payment_id: row.get(6)?,
        student_id: row.get(7)?,
        term_id: row.get(8)?,
        batch_id: row.get(9)?,
        requires_approval: requires_approval != 0,
        approved_by: row.get(11)?,
        approved_at: row.get(12)?,
        created_at: row.get(13)?,
    })
}

const ADJUSTMENT_COLUMNS: &str = "id, adjustment_type, description, original_amount, \
    adjusted_amount, variance, payment_id, student_id, term_id, batch_id, \
    requires_approval, approved_by, approved_at, created_at";

/// Adjustments newest first, optionally only those awaiting sign-off.
pub fn list(conn: &Connection, pending_only: bool) -> Result<Vec<Adjustment>> {
    let sql = if pending_only {
        format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM adjustments \
             WHERE requires_approval = 1 AND approved_by IS NULL ORDER BY id DESC"
        )
    } else {
        format!("SELECT {ADJUSTMENT_COLUMNS} FROM adjustments ORDER BY id DESC")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<Adjustment> = stmt
        .query_map([], map_adjustment)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Categorize a variance for the audit trail.
pub fn classify(result: &MatchResult) -> AdjustmentType {
    if result.missing_scholarship {
        return AdjustmentType::MissingScholarshipRecord;
    }
    if result.scholarship_domain {
        if result.variance_percentage > 10.0 {
            if result.over_applied() {
                AdjustmentType::ScholarshipOverapplied
            } else {
                AdjustmentType::ScholarshipUnderapplied
            }
        } else {
            AdjustmentType::ScholarshipVariance
        }
    } else {
        AdjustmentType::PricingVariance
    }
}

/// Persist an adjustment when the accepted match carries variance. Minor
/// pricing variances inside the auto-allocation tolerance are recorded or
/// skipped per the `record_minor_variance` policy; scholarship findings are
/// always recorded. Returns the adjustment id when one was written.
pub fn record_if_material(
    conn: &Connection,
    payment: &Payment,
    status_id: i64,
    batch_id: Option<i64>,
    result: &MatchResult,
    record_minor_variance: bool,
) -> Result<Option<i64>> {
    if result.variance_amount <= 0.0 {
        return Ok(None);
    }
    if !record_minor_variance
        && !result.scholarship_domain
        && result.variance_percentage <= GOOD_MATCH_TOLERANCE_PCT
    {
        return Ok(None);
    }

    let kind = classify(result);
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let requires_approval = thresholds::requires_approval(
        conn,
        result.variance_amount,
        result.variance_percentage,
        &today,
    )?;

    // Variance is recomputed from the two amounts at save time; the caller's
    // figure is not trusted.
    let variance = round_cents(result.actual_amount - result.expected_amount);
    let description = format!(
        "{}: expected {:.2}, observed {:.2} (method: {})",
        kind, result.expected_amount, result.actual_amount, result.method
    );

    conn.execute(
        "INSERT INTO adjustments (adjustment_type, description, original_amount, adjusted_amount, \
         variance, payment_id, status_id, student_id, term_id, batch_id, requires_approval) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            kind.as_str(),
            description,
            result.expected_amount,
            result.actual_amount,
            variance,
            payment.id,
            status_id,
            payment.student_id,
            payment.term_id,
            batch_id,
            requires_approval as i32,
        ],
    )?;
    Ok(Some(conn.last_insert_rowid()))
}

/// Sign off on an adjustment that required approval. Approval fields are the
/// only mutable part of an adjustment.
pub fn approve(conn: &Connection, id: i64, approver: &str) -> Result<()> {
    let row: Option<(i64, Option<String>)> = conn
        .query_row(
            "SELECT requires_approval, approved_by FROM adjustments WHERE id = ?1",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    match row {
        None => Err(BursarError::Other(format!("No adjustment with ID {id}"))),
        Some((0, _)) => Err(BursarError::Other(format!(
            "Adjustment {id} does not require approval"
        ))),
        Some((_, Some(by))) => Err(BursarError::Other(format!(
            "Adjustment {id} already approved by {by}"
        ))),
        Some((_, None)) => {
            conn.execute(
                "UPDATE adjustments SET approved_by = ?1, approved_at = datetime('now') WHERE id = ?2",
                rusqlite::params![approver, id],
            )?;
            Ok(())
        }
    }
}
