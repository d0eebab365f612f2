use rusqlite::Connection;

use crate::batch::{self, BatchRunOptions};
use crate::db::{get_connection, init_db, set_metadata};
use crate::error::Result;
use crate::fmt::pct;
use crate::models::BatchType;
use crate::settings::load_settings;

struct DemoStudent {
    name: &'static str,
    /// Course ids from the demo catalog.
    courses: &'static [i64],
}

const STUDENTS: &[DemoStudent] = &[
    DemoStudent { name: "Ana Castillo", courses: &[1, 2] },
    DemoStudent { name: "Ben Okafor", courses: &[1, 3] },
    DemoStudent { name: "Carla Mendez", courses: &[2, 3] },
    DemoStudent { name: "Diego Fuentes", courses: &[1] },
    DemoStudent { name: "Elena Petrov", courses: &[1, 2, 3] },
    DemoStudent { name: "Farid Hassan", courses: &[2] },
];

/// Course catalog: (name, code, price for the demo term).
const COURSES: &[(&str, &str, f64)] = &[
    ("Mathematics", "MATH-101", 300.0),
    ("Science", "SCI-101", 200.0),
    ("Literature", "LIT-101", 250.0),
];

struct DemoPayment {
    student: i64,
    amount: f64,
    reference: Option<&'static str>,
    notes: Option<&'static str>,
    invoice_amount: Option<f64>,
    received_date: &'static str,
}

/// A mix that exercises every matching tier: exact amounts, near misses,
/// scholarship wording with and without an award on file, an installment
/// pattern for the demo rule, and one payment nothing will explain.
const PAYMENTS: &[DemoPayment] = &[
    // Ana owes 500: pays exactly
    DemoPayment { student: 1, amount: 500.0, reference: Some("TRF-1001"), notes: None, invoice_amount: None, received_date: "2026-02-03" },
    // Ben owes 550: pays 535, within tolerance
    DemoPayment { student: 2, amount: 535.0, reference: Some("TRF-1002"), notes: None, invoice_amount: None, received_date: "2026-02-05" },
    // Carla owes 450: 20% scholarship on file, invoice kept
    DemoPayment { student: 3, amount: 360.0, reference: Some("TRF-1003"), notes: Some("scholarship applied"), invoice_amount: Some(450.0), received_date: "2026-02-07" },
    // Diego owes 300: scholarship wording but no award on file
    DemoPayment { student: 4, amount: 30.0, reference: None, notes: Some("NGO sponsored payment"), invoice_amount: None, received_date: "2026-02-10" },
    // Elena owes 750: first of two installments, caught by the demo rule
    DemoPayment { student: 5, amount: 375.0, reference: Some("TRF-1005"), notes: Some("installment 1 of 2"), invoice_amount: None, received_date: "2026-02-12" },
    // Farid owes 200: unexplained amount, lands in review
    DemoPayment { student: 6, amount: 155.0, reference: Some("TRF-1006"), notes: None, invoice_amount: None, received_date: "2026-02-14" },
];

fn seed(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT INTO terms (name, cycle, start_date, end_date) \
         VALUES ('2026 Spring', '2026', '2026-01-15', '2026-06-15')",
        [],
    )?;

    for (name, code, price) in COURSES {
        conn.execute(
            "INSERT INTO courses (name, code) VALUES (?1, ?2)",
            rusqlite::params![name, code],
        )?;
        let course_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO price_list (course_id, term_id, amount) VALUES (?1, 1, ?2)",
            rusqlite::params![course_id, price],
        )?;
    }

    for s in STUDENTS {
        conn.execute("INSERT INTO students (name) VALUES (?1)", [s.name])?;
        let student_id = conn.last_insert_rowid();
        for course_id in s.courses {
            conn.execute(
                "INSERT INTO enrollments (student_id, term_id, course_id) VALUES (?1, 1, ?2)",
                rusqlite::params![student_id, course_id],
            )?;
        }
    }

    // Carla carries a 20% merit award
    conn.execute(
        "INSERT INTO scholarships (student_id, name, percentage, start_date) \
         VALUES (3, 'Merit Award 20%', 20.0, '2025-09-01')",
        [],
    )?;

    for p in PAYMENTS {
        conn.execute(
            "INSERT INTO payments (student_id, term_id, amount, reference, notes, invoice_amount, received_date) \
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![p.student, p.amount, p.reference, p.notes, p.invoice_amount, p.received_date],
        )?;
    }

    conn.execute(
        "INSERT INTO rules (name, rule_type, parameters, confidence_threshold, priority) \
         VALUES ('installment plan', 'pattern', '{\"pattern\": \"installment\"}', 70, 10)",
        [],
    )?;
    conn.execute(
        "INSERT INTO thresholds (context, absolute_limit, percentage_limit, effective_date) \
         VALUES ('individual_payment', 100.0, 10.0, '2025-01-01')",
        [],
    )?;
    set_metadata(conn, "institution", "Westfield Academy")?;
    Ok(())
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let conn = get_connection(&data_dir.join("bursar.db"))?;
    init_db(&conn)?;

    seed(&conn)?;
    println!(
        "Loaded demo data: {} students, {} payments, 1 rule, 1 threshold.",
        STUDENTS.len(),
        PAYMENTS.len()
    );

    let batch = batch::run_batch(
        &conn,
        &BatchRunOptions {
            batch_type: BatchType::Initial,
            name: Some("demo initial run".into()),
            from_date: None,
            to_date: None,
            limit: None,
            record_minor_variance: settings.record_minor_variance,
        },
    )?;
    println!(
        "Initial batch: {} of {} matched ({} success).",
        batch.successful_matches,
        batch.total_payments,
        pct(batch.success_rate())
    );
    println!("Try `bursar report variance`, `bursar report unreconciled`, or `bursar status`.");
    Ok(())
}
