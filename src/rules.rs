use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;

use crate::confidence;
use crate::error::{BursarError, Result};
use crate::models::{Enrollment, Payment, Rule};

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Typed rule condition decoded from a rule's JSON parameters. One variant per
/// rule_type; each is a pure predicate plus a score.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Payment amount within a percentage band of a known recurring amount.
    AmountTolerance { expected: f64, tolerance_pct: f64 },
    /// Payment received inside a date window.
    DateRange { from: String, to: String },
    /// Free text (notes or reference) matches a pattern.
    Pattern { pattern: String, match_type: String },
    /// Student has a track record of successfully reconciled payments.
    StudentHistory { min_prior_matches: i64 },
    /// Student is enrolled in a known course combination this term.
    CourseCombination { course_ids: Vec<i64> },
}

/// Read-only evaluation context shared by all conditions for one payment.
pub struct RuleContext<'a> {
    pub conn: &'a Connection,
    pub enrollments: &'a [Enrollment],
}

#[derive(Deserialize)]
struct AmountToleranceParams {
    expected: f64,
    #[serde(default = "default_tolerance_pct")]
    tolerance_pct: f64,
}

fn default_tolerance_pct() -> f64 {
    2.0
}

#[derive(Deserialize)]
struct DateRangeParams {
    from: String,
    to: String,
}

#[derive(Deserialize)]
struct PatternParams {
    pattern: String,
    #[serde(default = "default_match_type")]
    match_type: String,
}

fn default_match_type() -> String {
    "contains".to_string()
}

#[derive(Deserialize)]
struct StudentHistoryParams {
    #[serde(default = "default_min_prior")]
    min_prior_matches: i64,
}

fn default_min_prior() -> i64 {
    3
}

#[derive(Deserialize)]
struct CourseCombinationParams {
    course_ids: Vec<i64>,
}

pub fn condition_for(rule: &Rule) -> Result<Condition> {
    match rule.rule_type.as_str() {
        "amount_tolerance" => {
            let p: AmountToleranceParams = serde_json::from_str(&rule.parameters)?;
            Ok(Condition::AmountTolerance {
                expected: p.expected,
                tolerance_pct: p.tolerance_pct,
            })
        }
        "date_range" => {
            let p: DateRangeParams = serde_json::from_str(&rule.parameters)?;
            Ok(Condition::DateRange { from: p.from, to: p.to })
        }
        "pattern" => {
            let p: PatternParams = serde_json::from_str(&rule.parameters)?;
            Ok(Condition::Pattern {
                pattern: p.pattern,
                match_type: p.match_type,
            })
        }
        "student_history" => {
            let p: StudentHistoryParams = serde_json::from_str(&rule.parameters)?;
            Ok(Condition::StudentHistory {
                min_prior_matches: p.min_prior_matches,
            })
        }
        "course_combination" => {
            let p: CourseCombinationParams = serde_json::from_str(&rule.parameters)?;
            Ok(Condition::CourseCombination { course_ids: p.course_ids })
        }
        other => Err(BursarError::Other(format!("unknown rule type: {other}"))),
    }
}

fn text_matches(text: &str, pattern: &str, match_type: &str) -> bool {
    let text_upper = text.to_uppercase();
    let pat_upper = pattern.to_uppercase();
    match match_type {
        "contains" => text_upper.contains(&pat_upper),
        "starts_with" => text_upper.starts_with(&pat_upper),
        "regex" => Regex::new(pattern)
            .map(|re| re.is_match(text))
            .unwrap_or(false),
        _ => false,
    }
}

impl Condition {
    pub fn matches(&self, payment: &Payment, ctx: &RuleContext) -> Result<bool> {
        match self {
            Self::AmountTolerance { expected, tolerance_pct } => {
                if *expected <= 0.0 {
                    return Ok(false);
                }
                let pct = (payment.amount - expected).abs() / expected * 100.0;
                Ok(pct <= *tolerance_pct)
            }
            Self::DateRange { from, to } => {
                Ok(payment.received_date.as_str() >= from.as_str()
                    && payment.received_date.as_str() <= to.as_str())
            }
            Self::Pattern { pattern, match_type } => {
                let notes = payment.notes.as_deref().unwrap_or("");
                let reference = payment.reference.as_deref().unwrap_or("");
                Ok(text_matches(notes, pattern, match_type)
                    || text_matches(reference, pattern, match_type))
            }
            Self::StudentHistory { min_prior_matches } => {
                let prior: i64 = ctx.conn.query_row(
                    "SELECT COUNT(*) FROM recon_status rs JOIN payments p ON rs.payment_id = p.id \
                     WHERE p.student_id = ?1 AND p.id != ?2 \
                     AND rs.status IN ('fully_reconciled', 'auto_allocated', 'scholarship_verified')",
                    [payment.student_id, payment.id],
                    |r| r.get(0),
                )?;
                Ok(prior >= *min_prior_matches)
            }
            Self::CourseCombination { course_ids } => {
                let enrolled: Vec<i64> = ctx.enrollments.iter().map(|e| e.course_id).collect();
                Ok(!course_ids.is_empty() && course_ids.iter().all(|c| enrolled.contains(c)))
            }
        }
    }

    /// Confidence contributed by this condition when it holds. Amount-based
    /// conditions score on closeness; the rest carry fixed evidence strength.
    pub fn score(&self, payment: &Payment) -> i64 {
        match self {
            Self::AmountTolerance { expected, .. } => {
                if *expected <= 0.0 {
                    return 0;
                }
                let pct = (payment.amount - expected).abs() / expected * 100.0;
                confidence::score_variance(pct)
            }
            Self::Pattern { .. } => 75,
            Self::StudentHistory { .. } => 70,
            Self::CourseCombination { .. } => 70,
            Self::DateRange { .. } => 65,
        }
    }
}

// ---------------------------------------------------------------------------
// Rule store
// ---------------------------------------------------------------------------

/// Active rules in evaluation order: ascending priority is higher precedence.
pub fn rules_by_priority(conn: &Connection) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, rule_type, parameters, confidence_threshold, priority, is_active, times_applied \
         FROM rules WHERE is_active = 1 ORDER BY priority ASC, id ASC",
    )?;
    let rows: Vec<Rule> = stmt
        .query_map([], |row| {
            Ok(Rule {
                id: row.get(0)?,
                name: row.get(1)?,
                rule_type: row.get(2)?,
                parameters: row.get(3)?,
                confidence_threshold: row.get(4)?,
                priority: row.get(5)?,
                is_active: row.get::<_, i64>(6)? != 0,
                times_applied: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Evaluate active rules against a payment, first acceptable rule wins.
/// A rule accepts when its condition holds and the condition's score reaches
/// the rule's own confidence_threshold. Malformed parameters make a rule
/// non-matching rather than failing the payment.
pub fn evaluate(payment: &Payment, ctx: &RuleContext) -> Result<Option<(Rule, i64)>> {
    for rule in rules_by_priority(ctx.conn)? {
        let condition = match condition_for(&rule) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if condition.matches(payment, ctx)? {
            let score = condition.score(payment);
            if score >= rule.confidence_threshold {
                ctx.conn.execute(
                    "UPDATE rules SET times_applied = times_applied + 1, \
                     last_applied_at = datetime('now') WHERE id = ?1",
                    [rule.id],
                )?;
                return Ok(Some((rule, score)));
            }
        }
    }
    Ok(None)
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

    fn payment(amount: f64, notes: Option<&str>) -> Payment {
        Payment {
            id: 1,
            student_id: 1,
            term_id: 1,
            amount,
            currency: "USD".into(),
            reference: Some("TRF-2026-0017".into()),
            notes: notes.map(|s| s.to_string()),
            invoice_amount: None,
            received_date: "2026-02-01".into(),
        }
    }

    fn add_rule(conn: &Connection, name: &str, rule_type: &str, params: &str, threshold: i64, priority: i64) {
        conn.execute(
            "INSERT INTO rules (name, rule_type, parameters, confidence_threshold, priority) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![name, rule_type, params, threshold, priority],
        )
        .unwrap();
    }

    #[test]
    fn test_amount_tolerance_condition() {
        let (_dir, conn) = test_db();
        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        let cond = Condition::AmountTolerance { expected: 500.0, tolerance_pct: 2.0 };
        assert!(cond.matches(&payment(495.0, None), &ctx).unwrap());
        assert!(!cond.matches(&payment(480.0, None), &ctx).unwrap());
        // 1% off scores 95
        assert_eq!(cond.score(&payment(495.0, None)), 95);
    }

    #[test]
    fn test_date_range_condition() {
        let (_dir, conn) = test_db();
        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        let cond = Condition::DateRange { from: "2026-01-01".into(), to: "2026-03-31".into() };
        assert!(cond.matches(&payment(100.0, None), &ctx).unwrap());
        let cond = Condition::DateRange { from: "2026-03-01".into(), to: "2026-03-31".into() };
        assert!(!cond.matches(&payment(100.0, None), &ctx).unwrap());
    }

    #[test]
    fn test_pattern_condition_checks_notes_and_reference() {
        let (_dir, conn) = test_db();
        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        let cond = Condition::Pattern { pattern: "trf-2026".into(), match_type: "contains".into() };
        assert!(cond.matches(&payment(100.0, None), &ctx).unwrap());
        let cond = Condition::Pattern { pattern: "monthly plan".into(), match_type: "contains".into() };
        assert!(cond.matches(&payment(100.0, Some("Monthly plan installment")), &ctx).unwrap());
        let cond = Condition::Pattern { pattern: r"^TRF-\d{4}".into(), match_type: "regex".into() };
        assert!(cond.matches(&payment(100.0, None), &ctx).unwrap());
        // Invalid regex never matches
        let cond = Condition::Pattern { pattern: "([".into(), match_type: "regex".into() };
        assert!(!cond.matches(&payment(100.0, None), &ctx).unwrap());
    }

    #[test]
    fn test_student_history_condition() {
        let (_dir, conn) = test_db();
        conn.execute("INSERT INTO students (name) VALUES ('Ana')", []).unwrap();
        conn.execute(
            "INSERT INTO terms (name, start_date, end_date) VALUES ('T', '2026-01-01', '2026-06-30')",
            [],
        )
        .unwrap();
        for i in 0..3 {
            conn.execute(
                "INSERT INTO payments (student_id, term_id, amount, received_date) VALUES (1, 1, 100.0, '2026-01-15')",
                [],
            )
            .unwrap();
            let pid = conn.last_insert_rowid();
            let status = if i < 2 { "fully_reconciled" } else { "pending_review" };
            conn.execute(
                "INSERT INTO recon_status (payment_id, status) VALUES (?1, ?2)",
                rusqlite::params![pid, status],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO payments (student_id, term_id, amount, received_date) VALUES (1, 1, 100.0, '2026-02-01')",
            [],
        )
        .unwrap();
        let current = conn.last_insert_rowid();

        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        let mut p = payment(100.0, None);
        p.id = current;
        let cond = Condition::StudentHistory { min_prior_matches: 2 };
        assert!(cond.matches(&p, &ctx).unwrap());
        let cond = Condition::StudentHistory { min_prior_matches: 3 };
        assert!(!cond.matches(&p, &ctx).unwrap(), "pending_review does not count as a prior match");
    }

    #[test]
    fn test_course_combination_condition() {
        let (_dir, conn) = test_db();
        let enrollments = vec![
            Enrollment { id: 1, student_id: 1, term_id: 1, course_id: 10 },
            Enrollment { id: 2, student_id: 1, term_id: 1, course_id: 11 },
        ];
        let ctx = RuleContext { conn: &conn, enrollments: &enrollments };
        let cond = Condition::CourseCombination { course_ids: vec![10, 11] };
        assert!(cond.matches(&payment(100.0, None), &ctx).unwrap());
        let cond = Condition::CourseCombination { course_ids: vec![10, 12] };
        assert!(!cond.matches(&payment(100.0, None), &ctx).unwrap());
        let cond = Condition::CourseCombination { course_ids: vec![] };
        assert!(!cond.matches(&payment(100.0, None), &ctx).unwrap());
    }

    #[test]
    fn test_evaluate_respects_priority_order() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "late", "pattern", r#"{"pattern": "TRF"}"#, 60, 20);
        add_rule(&conn, "early", "date_range", r#"{"from": "2026-01-01", "to": "2026-12-31"}"#, 60, 10);
        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        let (rule, score) = evaluate(&payment(100.0, None), &ctx).unwrap().unwrap();
        assert_eq!(rule.name, "early", "ascending priority wins");
        assert_eq!(score, 65);
    }

    #[test]
    fn test_evaluate_requires_confidence_threshold() {
        let (_dir, conn) = test_db();
        // Date range scores 65, below this rule's threshold of 80
        add_rule(&conn, "strict", "date_range", r#"{"from": "2026-01-01", "to": "2026-12-31"}"#, 80, 10);
        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        assert!(evaluate(&payment(100.0, None), &ctx).unwrap().is_none());
    }

    #[test]
    fn test_evaluate_bumps_usage_counters() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "r", "pattern", r#"{"pattern": "TRF"}"#, 60, 10);
        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        evaluate(&payment(100.0, None), &ctx).unwrap().unwrap();
        evaluate(&payment(100.0, None), &ctx).unwrap().unwrap();
        let (times, last): (i64, Option<String>) = conn
            .query_row("SELECT times_applied, last_applied_at FROM rules LIMIT 1", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(times, 2);
        assert!(last.is_some());
    }

    #[test]
    fn test_malformed_parameters_skip_rule() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "broken", "amount_tolerance", "not json", 60, 5);
        add_rule(&conn, "ok", "pattern", r#"{"pattern": "TRF"}"#, 60, 10);
        let ctx = RuleContext { conn: &conn, enrollments: &[] };
        let (rule, _) = evaluate(&payment(100.0, None), &ctx).unwrap().unwrap();
        assert_eq!(rule.name, "ok");
    }

    #[test]
    fn test_unknown_rule_type_rejected() {
        let rule = Rule {
            id: 1,
            name: "x".into(),
            rule_type: "teleport".into(),
            parameters: "{}".into(),
            confidence_threshold: 60,
            priority: 1,
            is_active: true,
            times_applied: 0,
        };
        assert!(condition_for(&rule).is_err());
    }
}
