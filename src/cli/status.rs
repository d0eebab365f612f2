use crate::db::{get_connection, get_metadata};
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join("bursar.db");

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;

        let institution = get_metadata(&conn, "institution");
        println!("Institution: {}", institution.as_deref().unwrap_or("(not set)"));

        let students: i64 = conn.query_row("SELECT count(*) FROM students", [], |r| r.get(0))?;
        let payments: i64 = conn.query_row("SELECT count(*) FROM payments", [], |r| r.get(0))?;
        let settled: i64 = conn.query_row(
            "SELECT count(*) FROM recon_status WHERE status = 'fully_reconciled'",
            [],
            |r| r.get(0),
        )?;
        let open: i64 = conn.query_row(
            "SELECT count(*) FROM payments p LEFT JOIN recon_status rs ON rs.payment_id = p.id \
             WHERE rs.status IS NULL OR rs.status IN ('unmatched', 'pending_review', 'exception_error')",
            [],
            |r| r.get(0),
        )?;
        let pending_adjustments: i64 = conn.query_row(
            "SELECT count(*) FROM adjustments WHERE requires_approval = 1 AND approved_by IS NULL",
            [],
            |r| r.get(0),
        )?;
        let rules: i64 =
            conn.query_row("SELECT count(*) FROM rules WHERE is_active = 1", [], |r| r.get(0))?;
        let batches: i64 = conn.query_row("SELECT count(*) FROM batches", [], |r| r.get(0))?;

        println!();
        println!("Students:             {students}");
        println!("Payments:             {payments}");
        println!("Fully reconciled:     {settled}");
        println!("Needing attention:    {open}");
        println!("Pending adjustments:  {pending_adjustments}");
        println!("Active rules:         {rules}");
        println!("Batches run:          {batches}");
    } else {
        println!();
        println!("Database not found. Run `bursar init` to set up.");
    }

    Ok(())
}
