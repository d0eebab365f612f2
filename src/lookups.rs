use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{BursarError, Result};
use crate::models::{Enrollment, Scholarship, Term};

/// Read-mostly lookup results cached for the lifetime of one batch run.
/// Constructed fresh per invocation and passed into the engine by reference,
/// so nothing survives beyond the batch.
#[derive(Default)]
pub struct BatchCache {
    terms: HashMap<i64, Term>,
    enrollments: HashMap<(i64, i64), Vec<Enrollment>>,
    scholarships: HashMap<(i64, i64), Vec<Scholarship>>,
    prices: HashMap<(i64, i64), f64>,
}

impl BatchCache {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn term(conn: &Connection, cache: &mut BatchCache, term_id: i64) -> Result<Term> {
    if let Some(t) = cache.terms.get(&term_id) {
        return Ok(t.clone());
    }
    let term = conn
        .query_row(
            "SELECT id, name, cycle, start_date, end_date FROM terms WHERE id = ?1",
            [term_id],
            |row| {
                Ok(Term {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    cycle: row.get(2)?,
                    start_date: row.get(3)?,
                    end_date: row.get(4)?,
                })
            },
        )
        .optional()?
        .ok_or(BursarError::UnknownTerm(term_id))?;
    cache.terms.insert(term_id, term.clone());
    Ok(term)
}

pub fn enrollments_for(
    conn: &Connection,
    cache: &mut BatchCache,
    student_id: i64,
    term_id: i64,
) -> Result<Vec<Enrollment>> {
    let key = (student_id, term_id);
    if let Some(list) = cache.enrollments.get(&key) {
        return Ok(list.clone());
    }
    let mut stmt = conn.prepare(
        "SELECT id, student_id, term_id, course_id FROM enrollments \
         WHERE student_id = ?1 AND term_id = ?2 ORDER BY id",
    )?;
    let list: Vec<Enrollment> = stmt
        .query_map([student_id, term_id], |row| {
            Ok(Enrollment {
                id: row.get(0)?,
                student_id: row.get(1)?,
                term_id: row.get(2)?,
                course_id: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    cache.enrollments.insert(key, list.clone());
    Ok(list)
}

/// Expected price for one course in one term. A course with no catalog row is
/// a lookup failure, not a zero price.
pub fn price_for(conn: &Connection, cache: &mut BatchCache, course_id: i64, term_id: i64) -> Result<f64> {
    let key = (course_id, term_id);
    if let Some(amount) = cache.prices.get(&key) {
        return Ok(*amount);
    }
    let amount: f64 = conn
        .query_row(
            "SELECT amount FROM price_list WHERE course_id = ?1 AND term_id = ?2",
            [course_id, term_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(BursarError::MissingPrice {
            course: course_id,
            term: term_id,
        })?;
    cache.prices.insert(key, amount);
    Ok(amount)
}

/// Sum of expected prices across a payment's enrollments.
pub fn expected_total(conn: &Connection, cache: &mut BatchCache, enrollments: &[Enrollment]) -> Result<f64> {
    let mut total = 0.0;
    for e in enrollments {
        total += price_for(conn, cache, e.course_id, e.term_id)?;
    }
    Ok(crate::fmt::round_cents(total))
}

/// Scholarships active for (student, term): started on or before the term's
/// end, and not ended before the term starts. If the term belongs to a cycle
/// and any matching award names that cycle, narrow to those awards.
pub fn active_scholarships_for(
    conn: &Connection,
    cache: &mut BatchCache,
    student_id: i64,
    term_id: i64,
) -> Result<Vec<Scholarship>> {
    let key = (student_id, term_id);
    if let Some(list) = cache.scholarships.get(&key) {
        return Ok(list.clone());
    }
    let term = term(conn, cache, term_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, student_id, name, percentage, fixed_amount, start_date, end_date, cycle \
         FROM scholarships \
         WHERE student_id = ?1 AND start_date <= ?2 AND (end_date IS NULL OR end_date >= ?3) \
         ORDER BY id",
    )?;
    let mut list: Vec<Scholarship> = stmt
        .query_map(
            rusqlite::params![student_id, term.end_date, term.start_date],
            |row| {
                Ok(Scholarship {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    name: row.get(2)?,
                    percentage: row.get(3)?,
                    fixed_amount: row.get(4)?,
                    start_date: row.get(5)?,
                    end_date: row.get(6)?,
                    cycle: row.get(7)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if let Some(ref cycle) = term.cycle {
        if list.iter().any(|s| s.cycle.as_deref() == Some(cycle)) {
            list.retain(|s| s.cycle.as_deref() == Some(cycle));
        }
    }

    cache.scholarships.insert(key, list.clone());
    Ok(list)
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

    fn seed_reference(conn: &Connection) {
        conn.execute("INSERT INTO students (name) VALUES ('Ana')", []).unwrap();
        conn.execute(
            "INSERT INTO terms (name, cycle, start_date, end_date) \
             VALUES ('2026-S1', 'primary', '2026-01-01', '2026-06-30')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO courses (name) VALUES ('Math')", []).unwrap();
        conn.execute("INSERT INTO courses (name) VALUES ('Science')", []).unwrap();
        conn.execute("INSERT INTO price_list (course_id, term_id, amount) VALUES (1, 1, 300.0)", [])
            .unwrap();
        conn.execute("INSERT INTO price_list (course_id, term_id, amount) VALUES (2, 1, 200.0)", [])
            .unwrap();
        conn.execute("INSERT INTO enrollments (student_id, term_id, course_id) VALUES (1, 1, 1)", [])
            .unwrap();
        conn.execute("INSERT INTO enrollments (student_id, term_id, course_id) VALUES (1, 1, 2)", [])
            .unwrap();
    }

    #[test]
    fn test_expected_total_sums_prices() {
        let (_dir, conn) = test_db();
        seed_reference(&conn);
        let mut cache = BatchCache::new();
        let enrollments = enrollments_for(&conn, &mut cache, 1, 1).unwrap();
        assert_eq!(enrollments.len(), 2);
        let total = expected_total(&conn, &mut cache, &enrollments).unwrap();
        assert_eq!(total, 500.0);
    }

    #[test]
    fn test_missing_price_is_lookup_failure() {
        let (_dir, conn) = test_db();
        seed_reference(&conn);
        conn.execute("DELETE FROM price_list WHERE course_id = 2", []).unwrap();
        let mut cache = BatchCache::new();
        let enrollments = enrollments_for(&conn, &mut cache, 1, 1).unwrap();
        let err = expected_total(&conn, &mut cache, &enrollments).unwrap_err();
        assert_eq!(err.category(), "LOOKUP_FAILURE");
    }

    #[test]
    fn test_price_cache_serves_repeat_lookups() {
        let (_dir, conn) = test_db();
        seed_reference(&conn);
        let mut cache = BatchCache::new();
        assert_eq!(price_for(&conn, &mut cache, 1, 1).unwrap(), 300.0);
        // Catalog change mid-batch is not observed; the cache is scoped to the run.
        conn.execute("UPDATE price_list SET amount = 999.0 WHERE course_id = 1", []).unwrap();
        assert_eq!(price_for(&conn, &mut cache, 1, 1).unwrap(), 300.0);
        let mut fresh = BatchCache::new();
        assert_eq!(price_for(&conn, &mut fresh, 1, 1).unwrap(), 999.0);
    }

    #[test]
    fn test_active_scholarship_window() {
        let (_dir, conn) = test_db();
        seed_reference(&conn);
        // Active: starts before term end, never ends
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date) \
             VALUES (1, 'Merit', 20.0, '2025-09-01')",
            [],
        )
        .unwrap();
        // Inactive: ended before the term started
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date, end_date) \
             VALUES (1, 'Expired', 50.0, '2024-01-01', '2025-12-31')",
            [],
        )
        .unwrap();
        // Inactive: starts after the term ends
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date) \
             VALUES (1, 'Future', 10.0, '2026-08-01')",
            [],
        )
        .unwrap();
        let mut cache = BatchCache::new();
        let active = active_scholarships_for(&conn, &mut cache, 1, 1).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Merit");
    }

    #[test]
    fn test_cycle_narrowing() {
        let (_dir, conn) = test_db();
        seed_reference(&conn);
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date, cycle) \
             VALUES (1, 'Primary Grant', 30.0, '2025-09-01', 'primary')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date, cycle) \
             VALUES (1, 'Secondary Grant', 40.0, '2025-09-01', 'secondary')",
            [],
        )
        .unwrap();
        let mut cache = BatchCache::new();
        let active = active_scholarships_for(&conn, &mut cache, 1, 1).unwrap();
        // Term cycle is 'primary'; awards naming that cycle win.
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Primary Grant");
    }

    #[test]
    fn test_cycle_narrowing_skipped_when_no_award_matches() {
        let (_dir, conn) = test_db();
        seed_reference(&conn);
        conn.execute(
            "INSERT INTO scholarships (student_id, name, percentage, start_date, cycle) \
             VALUES (1, 'Secondary Grant', 40.0, '2025-09-01', 'secondary')",
            [],
        )
        .unwrap();
        let mut cache = BatchCache::new();
        let active = active_scholarships_for(&conn, &mut cache, 1, 1).unwrap();
        assert_eq!(active.len(), 1, "no award shares the term cycle, so nothing is narrowed away");
    }
}
