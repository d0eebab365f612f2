use rusqlite::{Connection, OptionalExtension};

use crate::adjustments;
use crate::confidence;
use crate::error::{BursarError, Result};
use crate::fmt::round_cents;
use crate::lookups::{self, BatchCache};
use crate::models::{ConfidenceLevel, MatchResult, Payment, ReconStatus, StatusRow};
use crate::rules::{self, RuleContext};
use crate::scholarship;

/// Variance percentage accepted by the auto-allocation tier.
pub const GOOD_MATCH_TOLERANCE_PCT: f64 = 5.0;

/// Amounts closer than half a cent are equal.
const CENT_EPSILON: f64 = 0.005;

pub fn get_payment(conn: &Connection, payment_id: i64) -> Result<Payment> {
    conn.query_row(
        "SELECT id, student_id, term_id, amount, currency, reference, notes, invoice_amount, received_date \
         FROM payments WHERE id = ?1",
        [payment_id],
        |row| {
            Ok(Payment {
                id: row.get(0)?,
                student_id: row.get(1)?,
                term_id: row.get(2)?,
                amount: row.get(3)?,
                currency: row.get(4)?,
                reference: row.get(5)?,
                notes: row.get(6)?,
                invoice_amount: row.get(7)?,
                received_date: row.get(8)?,
            })
        },
    )
    .optional()?
    .ok_or(BursarError::UnknownPayment(payment_id))
}

pub fn get_status(conn: &Connection, payment_id: i64) -> Result<Option<StatusRow>> {
    let row = conn
        .query_row(
            "SELECT id, payment_id, status, confidence_level, confidence_score, pricing_method, \
             variance_amount, variance_percentage, refinement_attempts, last_attempt_at, \
             error_category, error_details, batch_id, notes \
             FROM recon_status WHERE payment_id = ?1",
            [payment_id],
            |row| {
                let status: String = row.get(2)?;
                Ok(StatusRow {
                    id: row.get(0)?,
                    payment_id: row.get(1)?,
                    status: ReconStatus::parse(&status).unwrap_or(ReconStatus::Unmatched),
                    confidence_level: row.get(3)?,
                    confidence_score: row.get(4)?,
                    pricing_method: row.get(5)?,
                    variance_amount: row.get(6)?,
                    variance_percentage: row.get(7)?,
                    refinement_attempts: row.get(8)?,
                    last_attempt_at: row.get(9)?,
                    error_category: row.get(10)?,
                    error_details: row.get(11)?,
                    batch_id: row.get(12)?,
                    notes: row.get(13)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Reconcile one payment. Re-entry on a FULLY_RECONCILED payment returns the
/// existing status untouched. All writes for the payment (status, matched
/// enrollments, history, adjustment, rule counters) commit atomically; a tier
/// failure rolls them back and the payment lands in EXCEPTION_ERROR instead.
pub fn reconcile(
    conn: &Connection,
    cache: &mut BatchCache,
    payment_id: i64,
    batch_id: Option<i64>,
    record_minor_variance: bool,
) -> Result<StatusRow> {
    let payment = get_payment(conn, payment_id)?;
    let existing = get_status(conn, payment_id)?;
    if let Some(ref s) = existing {
        if s.status == ReconStatus::FullyReconciled {
            return Ok(s.clone());
        }
    }

    let tx = conn.unchecked_transaction()?;
    match evaluate_tiers(conn, cache, &payment) {
        Ok(result) => {
            let row = apply_match(
                conn,
                &payment,
                existing.as_ref(),
                &result,
                batch_id,
                record_minor_variance,
            )?;
            tx.commit()?;
            Ok(row)
        }
        Err(err) => {
            // Dropping the transaction rolls back any partial tier writes.
            drop(tx);
            record_exception(conn, &payment, existing.as_ref(), &err, batch_id)
        }
    }
}

/// Ordered matching tiers; the first tier that accepts wins.
fn evaluate_tiers(conn: &Connection, cache: &mut BatchCache, payment: &Payment) -> Result<MatchResult> {
    let enrollments = lookups::enrollments_for(conn, cache, payment.student_id, payment.term_id)?;
    let expected_total = lookups::expected_total(conn, cache, &enrollments)?;
    let enrollment_ids: Vec<i64> = enrollments.iter().map(|e| e.id).collect();

    // Tier 1: exact pricing match
    if !enrollments.is_empty() && (payment.amount - expected_total).abs() < CENT_EPSILON {
        return Ok(MatchResult {
            method: "perfect_match".into(),
            status: ReconStatus::FullyReconciled,
            confidence_score: Some(confidence::PERFECT_SCORE),
            expected_amount: expected_total,
            actual_amount: payment.amount,
            variance_amount: 0.0,
            variance_percentage: 0.0,
            matched_enrollments: enrollment_ids,
            missing_scholarship: false,
            scholarship_domain: false,
            note: None,
        });
    }

    // Tier 2: pricing match within tolerance
    if !enrollments.is_empty() && payment.amount > 0.0 {
        let variance = round_cents((expected_total - payment.amount).abs());
        let pct = variance / payment.amount * 100.0;
        if pct <= GOOD_MATCH_TOLERANCE_PCT {
            return Ok(MatchResult {
                method: "tolerance_match".into(),
                status: ReconStatus::AutoAllocated,
                confidence_score: Some(confidence::score_variance(pct)),
                expected_amount: expected_total,
                actual_amount: payment.amount,
                variance_amount: variance,
                variance_percentage: pct,
                matched_enrollments: enrollment_ids,
                missing_scholarship: false,
                scholarship_domain: false,
                note: None,
            });
        }
    }

    // Tier 3: scholarship verification
    if let Some(result) = scholarship::verify(conn, cache, payment, expected_total)? {
        return Ok(result);
    }

    // Tier 4: rule-based matching
    let ctx = RuleContext {
        conn,
        enrollments: &enrollments,
    };
    if let Some((rule, score)) = rules::evaluate(payment, &ctx)? {
        let variance = round_cents((expected_total - payment.amount).abs());
        let pct = if payment.amount == 0.0 {
            0.0
        } else {
            variance / payment.amount * 100.0
        };
        return Ok(MatchResult {
            method: format!("rule:{}", rule.rule_type),
            status: ReconStatus::AutoAllocated,
            confidence_score: Some(score),
            expected_amount: expected_total,
            actual_amount: payment.amount,
            variance_amount: variance,
            variance_percentage: pct,
            matched_enrollments: enrollment_ids,
            missing_scholarship: false,
            scholarship_domain: false,
            note: Some(format!("matched by rule '{}'", rule.name)),
        });
    }

    // Tier 5: nothing automated applies; a human takes it from here
    Ok(MatchResult {
        method: "none".into(),
        status: ReconStatus::PendingReview,
        confidence_score: None,
        expected_amount: expected_total,
        actual_amount: payment.amount,
        variance_amount: 0.0,
        variance_percentage: 0.0,
        matched_enrollments: vec![],
        missing_scholarship: false,
        scholarship_domain: false,
        note: Some("no automated match found".into()),
    })
}

/// Tier-agnostic status write shared by every accepted tier.
fn apply_match(
    conn: &Connection,
    payment: &Payment,
    existing: Option<&StatusRow>,
    result: &MatchResult,
    batch_id: Option<i64>,
    record_minor_variance: bool,
) -> Result<StatusRow> {
    let level = result
        .confidence_score
        .map(|s| ConfidenceLevel::from_score(s).as_str().to_string());

    let status_id = match existing {
        Some(s) => {
            conn.execute(
                "UPDATE recon_status SET status = ?1, confidence_level = ?2, confidence_score = ?3, \
                 pricing_method = ?4, variance_amount = ?5, variance_percentage = ?6, \
                 refinement_attempts = refinement_attempts + 1, last_attempt_at = datetime('now'), \
                 error_category = NULL, error_details = NULL, batch_id = ?7, notes = ?8 \
                 WHERE id = ?9",
                rusqlite::params![
                    result.status.as_str(),
                    level,
                    result.confidence_score,
                    result.method,
                    result.variance_amount,
                    result.variance_percentage,
                    batch_id,
                    result.note,
                    s.id,
                ],
            )?;
            s.id
        }
        None => {
            conn.execute(
                "INSERT INTO recon_status (payment_id, status, confidence_level, confidence_score, \
                 pricing_method, variance_amount, variance_percentage, last_attempt_at, batch_id, notes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'), ?8, ?9)",
                rusqlite::params![
                    payment.id,
                    result.status.as_str(),
                    level,
                    result.confidence_score,
                    result.method,
                    result.variance_amount,
                    result.variance_percentage,
                    batch_id,
                    result.note,
                ],
            )?;
            conn.last_insert_rowid()
        }
    };

    let old_score = existing.and_then(|s| s.confidence_score);
    let reason = if existing.is_some() {
        "refinement attempt"
    } else {
        "initial attempt"
    };
    confidence::record_change(
        conn,
        status_id,
        old_score,
        result.confidence_score,
        &result.method,
        reason,
    )?;

    conn.execute("DELETE FROM status_enrollments WHERE status_id = ?1", [status_id])?;
    for enrollment_id in &result.matched_enrollments {
        conn.execute(
            "INSERT INTO status_enrollments (status_id, enrollment_id) VALUES (?1, ?2)",
            [status_id, *enrollment_id],
        )?;
    }

    adjustments::record_if_material(conn, payment, status_id, batch_id, result, record_minor_variance)?;

    get_status(conn, payment.id)?
        .ok_or_else(|| BursarError::Other("reconciliation status missing after write".into()))
}

/// Failure isolation: the error is captured on the payment's status row and
/// the batch moves on. EXCEPTION_ERROR is retryable on the next run.
fn record_exception(
    conn: &Connection,
    payment: &Payment,
    existing: Option<&StatusRow>,
    err: &BursarError,
    batch_id: Option<i64>,
) -> Result<StatusRow> {
    let category = err.category();
    let details = err.to_string();

    let status_id = match existing {
        Some(s) => {
            conn.execute(
                "UPDATE recon_status SET status = 'exception_error', confidence_level = NULL, \
                 confidence_score = NULL, pricing_method = NULL, variance_amount = 0, \
                 variance_percentage = 0, refinement_attempts = refinement_attempts + 1, \
                 last_attempt_at = datetime('now'), error_category = ?1, error_details = ?2, \
                 batch_id = ?3 WHERE id = ?4",
                rusqlite::params![category, details, batch_id, s.id],
            )?;
            s.id
        }
        None => {
            conn.execute(
                "INSERT INTO recon_status (payment_id, status, last_attempt_at, error_category, \
                 error_details, batch_id) \
                 VALUES (?1, 'exception_error', datetime('now'), ?2, ?3, ?4)",
                rusqlite::params![payment.id, category, details, batch_id],
            )?;
            conn.last_insert_rowid()
        }
    };

    let old_score = existing.and_then(|s| s.confidence_score);
    confidence::record_change(conn, status_id, old_score, None, "exception", category)?;

    get_status(conn, payment.id)?
        .ok_or_else(|| BursarError::Other("reconciliation status missing after write".into()))
}
