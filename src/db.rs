use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    external_ref TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS terms (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    cycle TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT
);

CREATE TABLE IF NOT EXISTS price_list (
    id INTEGER PRIMARY KEY,
    course_id INTEGER NOT NULL,
    term_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    FOREIGN KEY (course_id) REFERENCES courses(id),
    FOREIGN KEY (term_id) REFERENCES terms(id)
);

CREATE TABLE IF NOT EXISTS enrollments (
    id INTEGER PRIMARY KEY,
    student_id INTEGER NOT NULL,
    term_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    FOREIGN KEY (student_id) REFERENCES students(id),
    FOREIGN KEY (term_id) REFERENCES terms(id),
    FOREIGN KEY (course_id) REFERENCES courses(id)
);

CREATE TABLE IF NOT EXISTS scholarships (
    id INTEGER PRIMARY KEY,
    student_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    percentage REAL,
    fixed_amount REAL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    cycle TEXT,
    FOREIGN KEY (student_id) REFERENCES students(id)
);

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY,
    student_id INTEGER NOT NULL,
    term_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    reference TEXT,
    notes TEXT,
    invoice_amount REAL,
    received_date TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (student_id) REFERENCES students(id),
    FOREIGN KEY (term_id) REFERENCES terms(id)
);

CREATE TABLE IF NOT EXISTS batches (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    batch_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    from_date TEXT,
    to_date TEXT,
    total_payments INTEGER NOT NULL DEFAULT 0,
    processed_payments INTEGER NOT NULL DEFAULT 0,
    successful_matches INTEGER NOT NULL DEFAULT 0,
    failed_matches INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    parameters TEXT,
    results_summary TEXT
);

CREATE TABLE IF NOT EXISTS recon_status (
    id INTEGER PRIMARY KEY,
    payment_id INTEGER NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'unmatched',
    confidence_level TEXT,
    confidence_score INTEGER,
    pricing_method TEXT,
    variance_amount REAL NOT NULL DEFAULT 0,
    variance_percentage REAL NOT NULL DEFAULT 0,
    refinement_attempts INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,
    error_category TEXT,
    error_details TEXT,
    batch_id INTEGER,
    notes TEXT,
    FOREIGN KEY (payment_id) REFERENCES payments(id),
    FOREIGN KEY (batch_id) REFERENCES batches(id)
);

CREATE TABLE IF NOT EXISTS status_enrollments (
    status_id INTEGER NOT NULL,
    enrollment_id INTEGER NOT NULL,
    UNIQUE (status_id, enrollment_id),
    FOREIGN KEY (status_id) REFERENCES recon_status(id),
    FOREIGN KEY (enrollment_id) REFERENCES enrollments(id)
);

CREATE TABLE IF NOT EXISTS confidence_history (
    id INTEGER PRIMARY KEY,
    status_id INTEGER NOT NULL,
    changed_at TEXT DEFAULT (datetime('now')),
    old_score INTEGER,
    new_score INTEGER,
    method TEXT,
    reason TEXT,
    FOREIGN KEY (status_id) REFERENCES recon_status(id)
);

CREATE TABLE IF NOT EXISTS adjustments (
    id INTEGER PRIMARY KEY,
    adjustment_type TEXT NOT NULL,
    description TEXT,
    original_amount REAL NOT NULL,
    adjusted_amount REAL NOT NULL,
    variance REAL NOT NULL,
    payment_id INTEGER NOT NULL,
    status_id INTEGER NOT NULL,
    student_id INTEGER,
    term_id INTEGER,
    batch_id INTEGER,
    requires_approval INTEGER NOT NULL DEFAULT 0,
    approved_by TEXT,
    approved_at TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (payment_id) REFERENCES payments(id),
    FOREIGN KEY (status_id) REFERENCES recon_status(id),
    FOREIGN KEY (student_id) REFERENCES students(id),
    FOREIGN KEY (term_id) REFERENCES terms(id),
    FOREIGN KEY (batch_id) REFERENCES batches(id)
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    rule_type TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '{}',
    confidence_threshold INTEGER NOT NULL DEFAULT 60,
    priority INTEGER NOT NULL DEFAULT 100,
    is_active INTEGER DEFAULT 1,
    times_applied INTEGER NOT NULL DEFAULT 0,
    last_applied_at TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS thresholds (
    id INTEGER PRIMARY KEY,
    context TEXT NOT NULL,
    absolute_limit REAL NOT NULL,
    percentage_limit REAL,
    effective_date TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn get_metadata(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM metadata WHERE key = ?1", [key], |r| r.get(0))
        .optional()
        .ok()
        .flatten()
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "students",
            "terms",
            "courses",
            "price_list",
            "enrollments",
            "scholarships",
            "payments",
            "batches",
            "recon_status",
            "status_enrollments",
            "confidence_history",
            "adjustments",
            "rules",
            "thresholds",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_metadata_roundtrip() {
        let (_dir, conn) = test_db();
        assert!(get_metadata(&conn, "institution").is_none());
        set_metadata(&conn, "institution", "Westfield Academy").unwrap();
        assert_eq!(get_metadata(&conn, "institution").as_deref(), Some("Westfield Academy"));
        set_metadata(&conn, "institution", "Eastgate College").unwrap();
        assert_eq!(get_metadata(&conn, "institution").as_deref(), Some("Eastgate College"));
    }

    #[test]
    fn test_status_unique_per_payment() {
        let (_dir, conn) = test_db();
        conn.execute("INSERT INTO students (name) VALUES ('A')", []).unwrap();
        conn.execute(
            "INSERT INTO terms (name, start_date, end_date) VALUES ('T1', '2026-01-01', '2026-06-30')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO payments (student_id, term_id, amount, received_date) VALUES (1, 1, 100.0, '2026-02-01')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO recon_status (payment_id) VALUES (1)", []).unwrap();
        let dup = conn.execute("INSERT INTO recon_status (payment_id) VALUES (1)", []);
        assert!(dup.is_err(), "second status row for the same payment must be rejected");
    }
}
