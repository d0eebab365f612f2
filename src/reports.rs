use rusqlite::Connection;

use crate::adjustments;
use crate::error::Result;
use crate::models::Adjustment;

pub struct TypeBreakdown {
    pub adjustment_type: String,
    pub count: i64,
    pub total_variance: f64,
}

pub struct VarianceSummary {
    pub by_type: Vec<TypeBreakdown>,
    pub total_adjustments: i64,
    /// Sum of absolute variances across all adjustments.
    pub total_variance: f64,
    pub pending_approval: i64,
    /// Largest absolute variances first.
    pub top: Vec<Adjustment>,
    pub recommendations: Vec<String>,
}

pub struct UnreconciledRow {
    pub payment_id: i64,
    pub student: String,
    pub term: String,
    pub amount: f64,
    pub received_date: String,
    pub status: String,
    pub error_category: Option<String>,
    pub notes: Option<String>,
}

/// Variance summary across adjustments, optionally restricted to those
/// created on one day (the daily close view).
pub fn variance_summary(conn: &Connection, on_date: Option<&str>) -> Result<VarianceSummary> {
    let mut stmt = conn.prepare(
        "SELECT adjustment_type, count(*), sum(abs(variance)) FROM adjustments \
         WHERE (?1 IS NULL OR date(created_at) = ?1) \
         GROUP BY adjustment_type ORDER BY sum(abs(variance)) DESC",
    )?;
    let by_type: Vec<TypeBreakdown> = stmt
        .query_map([on_date], |row| {
            Ok(TypeBreakdown {
                adjustment_type: row.get(0)?,
                count: row.get(1)?,
                total_variance: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let total_adjustments = by_type.iter().map(|t| t.count).sum();
    let total_variance = by_type.iter().map(|t| t.total_variance).sum();
    let pending_approval: i64 = conn.query_row(
        "SELECT count(*) FROM adjustments WHERE requires_approval = 1 AND approved_by IS NULL \
         AND (?1 IS NULL OR date(created_at) = ?1)",
        [on_date],
        |r| r.get(0),
    )?;

    let mut top = adjustments::list(conn, false)?;
    if let Some(day) = on_date {
        top.retain(|a| a.created_at.as_deref().is_some_and(|c| c.starts_with(day)));
    }
    top.sort_by(|a, b| {
        b.variance
            .abs()
            .partial_cmp(&a.variance.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    top.truncate(10);

    let recommendations = recommend(&by_type, pending_approval);

    Ok(VarianceSummary {
        by_type,
        total_adjustments,
        total_variance,
        pending_approval,
        top,
        recommendations,
    })
}

/// Patterns in the adjustment mix that point at an upstream process problem.
fn recommend(by_type: &[TypeBreakdown], pending_approval: i64) -> Vec<String> {
    let count_of = |t: &str| {
        by_type
            .iter()
            .find(|b| b.adjustment_type == t)
            .map_or(0, |b| b.count)
    };

    let mut out = Vec::new();
    if count_of("missing_scholarship_record") > 3 {
        out.push(
            "Multiple payments show scholarship indicators with no award on file; \
             review the scholarship register for unrecorded awards."
                .to_string(),
        );
    }
    if count_of("scholarship_overapplied") > 5 {
        out.push(
            "Over-applied scholarship discounts recur; review how award percentages \
             are entered at the point of payment."
                .to_string(),
        );
    }
    if count_of("pricing_variance") > 10 {
        out.push(
            "Frequent pricing variances; check the price list against what the \
             billing office actually charges."
                .to_string(),
        );
    }
    if pending_approval > 0 {
        out.push(format!(
            "{pending_approval} adjustment(s) exceed materiality thresholds and await approval."
        ));
    }
    out
}

/// Payments still needing human attention, oldest first.
pub fn unreconciled(conn: &Connection) -> Result<Vec<UnreconciledRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, s.name, t.name, p.amount, p.received_date, \
                coalesce(rs.status, 'unmatched'), rs.error_category, rs.notes \
         FROM payments p \
         JOIN students s ON s.id = p.student_id \
         JOIN terms t ON t.id = p.term_id \
         LEFT JOIN recon_status rs ON rs.payment_id = p.id \
         WHERE rs.status IS NULL OR rs.status IN ('unmatched', 'pending_review', 'exception_error') \
         ORDER BY p.received_date, p.id",
    )?;
    let rows: Vec<UnreconciledRow> = stmt
        .query_map([], |row| {
            Ok(UnreconciledRow {
                payment_id: row.get(0)?,
                student: row.get(1)?,
                term: row.get(2)?,
                amount: row.get(3)?,
                received_date: row.get(4)?,
                status: row.get(5)?,
                error_category: row.get(6)?,
                notes: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
