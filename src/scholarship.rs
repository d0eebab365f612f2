use rusqlite::Connection;

use crate::error::Result;
use crate::fmt::round_cents;
use crate::lookups::{self, BatchCache};
use crate::models::{MatchResult, Payment, ReconStatus};
use crate::confidence::{self, MISSING_RECORD_SCORE};

/// Free-text markers of scholarship intent in legacy payment notes.
const SCHOLARSHIP_KEYWORDS: &[&str] = &[
    "scholarship",
    "grant",
    "aid",
    "award",
    "sponsor",
    "funded",
    "ngo",
    "foundation",
    "donor",
    "sponsored",
    "sch.",
];

/// Generic discount wording that explains a small amount without a scholarship.
const DISCOUNT_WORDS: &[&str] = &["discount", "disc.", "promo", "rebate"];

/// Payments at or below this are suspicious enough to check for an award
/// even without keywords.
const SMALL_PAYMENT_FLOOR: f64 = 50.0;

/// Whole-token match so that e.g. "paid" does not trigger on "aid".
/// Dotted abbreviations ("sch.") fall back to substring matching.
fn mentions_any(text: &str, words: &[&str]) -> bool {
    let lower = text.to_lowercase();
    words.iter().any(|w| {
        if w.chars().any(|c| !c.is_alphanumeric()) {
            lower.contains(w)
        } else {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token == *w)
        }
    })
}

pub fn has_scholarship_indicators(payment: &Payment) -> bool {
    let notes = payment.notes.as_deref().unwrap_or("");
    if mentions_any(notes, SCHOLARSHIP_KEYWORDS) {
        return true;
    }
    payment.amount <= SMALL_PAYMENT_FLOOR && !mentions_any(notes, DISCOUNT_WORDS)
}

/// Scholarship verification tier. Yields None when the payment shows no
/// scholarship intent so the engine falls through to the next tier.
pub fn verify(
    conn: &Connection,
    cache: &mut BatchCache,
    payment: &Payment,
    expected_total: f64,
) -> Result<Option<MatchResult>> {
    if !has_scholarship_indicators(payment) {
        return Ok(None);
    }

    // The pre-discount amount comes from the invoice when the legacy record
    // kept it, otherwise from the pricing catalog.
    let original_amount = payment.invoice_amount.unwrap_or(expected_total);
    let actual_discount = round_cents(original_amount - payment.amount);

    let scholarships =
        lookups::active_scholarships_for(conn, cache, payment.student_id, payment.term_id)?;

    if scholarships.is_empty() {
        // Indicators with no award on file: a match, but a conspicuous one.
        let variance = actual_discount.abs();
        let variance_pct = if payment.amount == 0.0 {
            0.0
        } else {
            variance / payment.amount * 100.0
        };
        return Ok(Some(MatchResult {
            method: "scholarship".into(),
            status: ReconStatus::ScholarshipVerified,
            confidence_score: Some(MISSING_RECORD_SCORE),
            expected_amount: 0.0,
            actual_amount: actual_discount,
            variance_amount: variance,
            variance_percentage: variance_pct,
            matched_enrollments: vec![],
            missing_scholarship: true,
            scholarship_domain: true,
            note: Some("scholarship indicators present but no award on file".into()),
        }));
    }

    let mut expected_discount = 0.0;
    for s in &scholarships {
        if let Some(pct) = s.percentage {
            expected_discount += payment.amount * pct / 100.0;
        } else {
            expected_discount += s.fixed_amount.unwrap_or(0.0);
        }
    }
    let expected_discount = round_cents(expected_discount.min(payment.amount));

    let variance = round_cents((actual_discount - expected_discount).abs());
    let variance_pct = if payment.amount == 0.0 {
        0.0
    } else {
        variance / payment.amount * 100.0
    };
    let score = confidence::score_variance(variance_pct);

    let names: Vec<&str> = scholarships.iter().map(|s| s.name.as_str()).collect();
    Ok(Some(MatchResult {
        method: "scholarship".into(),
        status: ReconStatus::ScholarshipVerified,
        confidence_score: Some(score),
        expected_amount: expected_discount,
        actual_amount: actual_discount,
        variance_amount: variance,
        variance_percentage: variance_pct,
        matched_enrollments: vec![],
        missing_scholarship: false,
        scholarship_domain: true,
        note: Some(format!("verified against: {}", names.join(", "))),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn seed_student_term(conn: &Connection) {
        conn.execute("INSERT INTO students (name) VALUES ('Ana')", []).unwrap();
        conn.execute(
            "INSERT INTO terms (name, start_date, end_date) VALUES ('2026-S1', '2026-01-01', '2026-06-30')",
            [],
        )
        .unwrap();
    }

    fn payment(amount: f64, notes: Option<&str>, invoice: Option<f64>) -> Payment {
        Payment {
            id: 1,
            student_id: 1,
            term_id: 1,
            amount,
            currency: "USD".into(),
            reference: None,
            notes: notes.map(|s| s.to_string()),
            invoice_amount: invoice,
            received_date: "2026-02-01".into(),
        }
    }

    #[test]
    fn test_keyword_detection() {
        assert!(has_scholarship_indicators(&payment(400.0, Some("NGO grant Q1"), None)));
        assert!(has_scholarship_indicators(&payment(400.0, Some("Sch. fund 2026"), None)));
        assert!(has_scholarship_indicators(&payment(400.0, Some("Sponsored by foundation"), None)));
        assert!(!has_scholarship_indicators(&payment(400.0, Some("regular tuition"), None)));
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        // "paid" must not trigger on "aid"
        assert!(!has_scholarship_indicators(&payment(400.0, Some("paid in full"), None)));
        assert!(has_scholarship_indicators(&payment(400.0, Some("financial aid"), None)));
    }

    #[test]
    fn test_small_amount_floor() {
        assert!(has_scholarship_indicators(&payment(20.0, None, None)));
        assert!(has_scholarship_indicators(&payment(50.0, Some("enrollment"), None)));
        // Small amount already explained by a generic discount
        assert!(!has_scholarship_indicators(&payment(20.0, Some("sibling discount"), None)));
        assert!(!has_scholarship_indicators(&payment(51.0, Some("enrollment"), None)));
    }

    #[test]
    fn test_no_indicators_falls_through() {
        let (_dir, conn) = test_db();
        seed_student_term(&conn);
        let mut cache = BatchCache::new();
        let p = payment(400.0, Some("tuition wire"), None);
        assert!(verify(&conn, &mut cache, &p, 500.0).unwrap().is_none());
    }

    #[test]
    fn test_missing_record_flagged_low_confidence() {
        let (_dir, conn) = test_db();
        seed_student_term(&conn);
        let mut cache = BatchCache::new();
        let p = payment(20.0, Some("scholarship"), None);
        let result = verify(&conn, &mut cache, &p, 500.0).unwrap().unwrap();
        assert_eq!(result.status, ReconStatus::ScholarshipVerified);
        assert_eq!(result.confidence_score, Some(30));
        assert!(result.missing_scholarship);
        // Unexplained discount: catalog price 500 vs 20 received
        assert_eq!(result.variance_amount, 480.0);
    }

    #[test]
    fn test_percentage_award_variance() {
        let (_dir, conn) = test_db();
        seed_student_term(&conn);
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date) \
             VALUES (1, 'Merit 20', 20.0, '2025-09-01')",
            [],
        )
        .unwrap();
        let mut cache = BatchCache::new();
        // Invoice 125, paid 100: actual discount 25, expected 20% of 100 = 20
        let p = payment(100.0, Some("scholarship payment"), Some(125.0));
        let result = verify(&conn, &mut cache, &p, 125.0).unwrap().unwrap();
        assert_eq!(result.expected_amount, 20.0);
        assert_eq!(result.actual_amount, 25.0);
        assert_eq!(result.variance_amount, 5.0);
        assert_eq!(result.variance_percentage, 5.0);
        assert_eq!(result.confidence_score, Some(80));
        assert!(result.over_applied());
    }

    #[test]
    fn test_fixed_award_and_cap() {
        let (_dir, conn) = test_db();
        seed_student_term(&conn);
        conn.execute(
            "INSERT INTO scholarships (student_id, name, fixed_amount, start_date) \
             VALUES (1, 'Hardship', 500.0, '2025-09-01')",
            [],
        )
        .unwrap();
        let mut cache = BatchCache::new();
        // Award exceeds the payment; expected discount is capped at the amount.
        let p = payment(100.0, Some("grant payment"), Some(600.0));
        let result = verify(&conn, &mut cache, &p, 600.0).unwrap().unwrap();
        assert_eq!(result.expected_amount, 100.0);
        assert_eq!(result.actual_amount, 500.0);
        assert_eq!(result.variance_amount, 400.0);
    }

    #[test]
    fn test_zero_amount_payment_has_zero_percentage() {
        let (_dir, conn) = test_db();
        seed_student_term(&conn);
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date) \
             VALUES (1, 'Full ride', 100.0, '2025-09-01')",
            [],
        )
        .unwrap();
        let mut cache = BatchCache::new();
        let p = payment(0.0, Some("scholarship covers all"), Some(500.0));
        let result = verify(&conn, &mut cache, &p, 500.0).unwrap().unwrap();
        assert_eq!(result.variance_percentage, 0.0);
        assert!(result.variance_amount >= 0.0);
    }
}
