use rusqlite::{Connection, OptionalExtension};

use crate::engine;
use crate::error::{BursarError, Result};
use crate::lookups::BatchCache;
use crate::models::{Batch, BatchStatus, BatchType};

pub struct BatchRunOptions {
    pub batch_type: BatchType,
    pub name: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    /// Cap on payments processed this run; the rest stay for `resume`.
    pub limit: Option<usize>,
    pub record_minor_variance: bool,
}

fn map_batch(row: &rusqlite::Row) -> rusqlite::Result<Batch> {
    let batch_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Batch {
        id: row.get(0)?,
        name: row.get(1)?,
        batch_type: BatchType::parse(&batch_type).unwrap_or(BatchType::Manual),
        status: BatchStatus::parse(&status).unwrap_or(BatchStatus::Pending),
        from_date: row.get(4)?,
        to_date: row.get(5)?,
        total_payments: row.get(6)?,
        processed_payments: row.get(7)?,
        successful_matches: row.get(8)?,
        failed_matches: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
        results_summary: row.get(12)?,
    })
}

const BATCH_COLUMNS: &str = "id, name, batch_type, status, from_date, to_date, \
    total_payments, processed_payments, successful_matches, failed_matches, \
    started_at, completed_at, results_summary";

pub fn get_batch(conn: &Connection, batch_id: i64) -> Result<Batch> {
    conn.query_row(
        &format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?1"),
        [batch_id],
        map_batch,
    )
    .optional()?
    .ok_or(BursarError::UnknownBatch(batch_id))
}

pub fn list(conn: &Connection) -> Result<Vec<Batch>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {BATCH_COLUMNS} FROM batches ORDER BY id DESC"))?;
    let rows: Vec<Batch> = stmt
        .query_map([], map_batch)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Payments eligible for a run: in the date window and not yet in the
/// terminal FULLY_RECONCILED state. Refinement passes therefore revisit
/// pending, exception and tolerance matches but never touch settled ones.
fn candidate_payments(
    conn: &Connection,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT p.id FROM payments p \
         LEFT JOIN recon_status rs ON rs.payment_id = p.id \
         WHERE (rs.status IS NULL OR rs.status != 'fully_reconciled') \
           AND (?1 IS NULL OR p.received_date >= ?1) \
           AND (?2 IS NULL OR p.received_date <= ?2) \
         ORDER BY p.id",
    )?;
    let ids: Vec<i64> = stmt
        .query_map(rusqlite::params![from_date, to_date], |r| r.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Start a new batch over the eligible payments and process it. With a limit
/// the batch is left in PROCESSING for a later `resume`; otherwise it is
/// finalized from its counters.
pub fn run_batch(conn: &Connection, opts: &BatchRunOptions) -> Result<Batch> {
    let ids = candidate_payments(conn, opts.from_date.as_deref(), opts.to_date.as_deref())?;

    let name = match &opts.name {
        Some(n) => n.clone(),
        None => format!(
            "{} run {}",
            opts.batch_type.as_str(),
            chrono::Local::now().format("%Y-%m-%d %H:%M")
        ),
    };
    let parameters = serde_json::json!({
        "from": opts.from_date,
        "to": opts.to_date,
        "limit": opts.limit,
    });
    conn.execute(
        "INSERT INTO batches (name, batch_type, status, from_date, to_date, total_payments, started_at, parameters) \
         VALUES (?1, ?2, 'processing', ?3, ?4, ?5, datetime('now'), ?6)",
        rusqlite::params![
            name,
            opts.batch_type.as_str(),
            opts.from_date,
            opts.to_date,
            ids.len() as i64,
            parameters.to_string(),
        ],
    )?;
    let batch_id = conn.last_insert_rowid();

    let slice: &[i64] = match opts.limit {
        Some(n) if n < ids.len() => &ids[..n],
        _ => &ids,
    };
    process_payments(conn, batch_id, slice, opts.record_minor_variance)?;
    finalize(conn, batch_id)
}

/// Pick up a PROCESSING batch where it stopped. Payments already carrying a
/// status from this batch are skipped.
pub fn resume(conn: &Connection, batch_id: i64, record_minor_variance: bool) -> Result<Batch> {
    let batch = get_batch(conn, batch_id)?;
    if batch.status != BatchStatus::Processing {
        return Err(BursarError::Other(format!(
            "Batch {} is {}, only processing batches can be resumed",
            batch_id,
            batch.status.as_str()
        )));
    }

    let candidates = candidate_payments(conn, batch.from_date.as_deref(), batch.to_date.as_deref())?;
    let mut stmt =
        conn.prepare("SELECT 1 FROM recon_status WHERE payment_id = ?1 AND batch_id = ?2")?;
    let mut remaining = Vec::new();
    for id in candidates {
        let seen: Option<i64> = stmt
            .query_row(rusqlite::params![id, batch_id], |r| r.get(0))
            .optional()?;
        if seen.is_none() {
            remaining.push(id);
        }
    }
    drop(stmt);

    process_payments(conn, batch_id, &remaining, record_minor_variance)?;
    finalize(conn, batch_id)
}

/// Sequential pass over the payments. Counter updates are single atomic SQL
/// increments so a crash never leaves processed != successful + failed.
fn process_payments(
    conn: &Connection,
    batch_id: i64,
    payment_ids: &[i64],
    record_minor_variance: bool,
) -> Result<()> {
    let mut cache = BatchCache::new();
    for &payment_id in payment_ids {
        let counted_success = match engine::reconcile(
            conn,
            &mut cache,
            payment_id,
            Some(batch_id),
            record_minor_variance,
        ) {
            Ok(row) => row.status.is_success(),
            // The engine already isolates per-payment failures; an Err here
            // means even the exception record could not be written. The batch
            // still moves on.
            Err(_) => false,
        };
        let counter = if counted_success {
            "successful_matches"
        } else {
            "failed_matches"
        };
        conn.execute(
            &format!(
                "UPDATE batches SET processed_payments = processed_payments + 1, \
                 {counter} = {counter} + 1 WHERE id = ?1"
            ),
            [batch_id],
        )?;
    }
    Ok(())
}

/// Settle the batch status from its counters. A batch with unprocessed
/// payments stays PROCESSING and never gets a completed_at.
fn finalize(conn: &Connection, batch_id: i64) -> Result<Batch> {
    let batch = get_batch(conn, batch_id)?;
    if batch.processed_payments < batch.total_payments {
        return Ok(batch);
    }

    let status = if batch.total_payments == 0 || batch.failed_matches == 0 {
        BatchStatus::Completed
    } else if batch.successful_matches == 0 {
        BatchStatus::Failed
    } else {
        BatchStatus::Partial
    };
    let summary = serde_json::json!({
        "total": batch.total_payments,
        "processed": batch.processed_payments,
        "successful": batch.successful_matches,
        "failed": batch.failed_matches,
        "success_rate": batch.success_rate(),
    });
    conn.execute(
        "UPDATE batches SET status = ?1, completed_at = datetime('now'), results_summary = ?2 \
         WHERE id = ?3",
        rusqlite::params![status.as_str(), summary.to_string(), batch_id],
    )?;
    get_batch(conn, batch_id)
}
