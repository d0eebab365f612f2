use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{Threshold, ThresholdContext};

/// Current materiality threshold for a context: the most recent row whose
/// effective_date is on or before the evaluation date.
pub fn threshold_for(
    conn: &Connection,
    context: ThresholdContext,
    as_of: &str,
) -> Result<Option<Threshold>> {
    let row = conn
        .query_row(
            "SELECT id, context, absolute_limit, percentage_limit, effective_date FROM thresholds \
             WHERE context = ?1 AND effective_date <= ?2 \
             ORDER BY effective_date DESC, id DESC LIMIT 1",
            rusqlite::params![context.as_str(), as_of],
            |row| {
                let ctx: String = row.get(1)?;
                Ok(Threshold {
                    id: row.get(0)?,
                    context: ThresholdContext::parse(&ctx).unwrap_or(ThresholdContext::IndividualPayment),
                    absolute_limit: row.get(2)?,
                    percentage_limit: row.get(3)?,
                    effective_date: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Whether a variance on a single payment needs human sign-off. With no
/// threshold configured for the context, nothing requires approval.
pub fn requires_approval(
    conn: &Connection,
    variance_amount: f64,
    variance_pct: f64,
    as_of: &str,
) -> Result<bool> {
    match threshold_for(conn, ThresholdContext::IndividualPayment, as_of)? {
        None => Ok(false),
        Some(t) => Ok(variance_amount >= t.absolute_limit
            || t.percentage_limit.is_some_and(|p| variance_pct > p)),
    }
}

pub fn add(
    conn: &Connection,
    context: ThresholdContext,
    absolute_limit: f64,
    percentage_limit: Option<f64>,
    effective_date: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO thresholds (context, absolute_limit, percentage_limit, effective_date) \
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![context.as_str(), absolute_limit, percentage_limit, effective_date],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list(conn: &Connection) -> Result<Vec<Threshold>> {
    let mut stmt = conn.prepare(
        "SELECT id, context, absolute_limit, percentage_limit, effective_date FROM thresholds \
         ORDER BY context, effective_date DESC",
    )?;
    let rows: Vec<Threshold> = stmt
        .query_map([], |row| {
            let ctx: String = row.get(1)?;
            Ok(Threshold {
                id: row.get(0)?,
                context: ThresholdContext::parse(&ctx).unwrap_or(ThresholdContext::IndividualPayment),
                absolute_limit: row.get(2)?,
                percentage_limit: row.get(3)?,
                effective_date: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
