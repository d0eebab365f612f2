use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::batch::{self, BatchRunOptions};
use crate::db::get_connection;
use crate::error::{BursarError, Result};
use crate::fmt::pct;
use crate::models::{Batch, BatchStatus, BatchType};
use crate::settings::{db_path, load_settings};

pub fn run(
    batch_type: &str,
    name: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let batch_type = BatchType::parse(batch_type)
        .ok_or_else(|| BursarError::Other(format!("unknown batch type: {batch_type}")))?;
    let settings = load_settings();
    let conn = get_connection(&db_path())?;

    let batch = batch::run_batch(
        &conn,
        &BatchRunOptions {
            batch_type,
            name,
            from_date,
            to_date,
            limit,
            record_minor_variance: settings.record_minor_variance,
        },
    )?;
    print_outcome(&batch);
    Ok(())
}

pub fn resume(id: i64) -> Result<()> {
    let settings = load_settings();
    let conn = get_connection(&db_path())?;
    let batch = batch::resume(&conn, id, settings.record_minor_variance)?;
    print_outcome(&batch);
    Ok(())
}

fn print_outcome(batch: &Batch) {
    let status = match batch.status {
        BatchStatus::Completed => batch.status.as_str().green().bold(),
        BatchStatus::Failed => batch.status.as_str().red().bold(),
        _ => batch.status.as_str().yellow().bold(),
    };
    println!("Batch {} '{}': {status}", batch.id, batch.name);
    println!(
        "  Processed {} of {} payments: {} matched, {} need attention ({} success)",
        batch.processed_payments,
        batch.total_payments,
        batch.successful_matches,
        batch.failed_matches,
        pct(batch.success_rate())
    );
    if batch.status == BatchStatus::Processing {
        println!("  Run `bursar batch resume {}` to continue.", batch.id);
    }
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let batches = batch::list(&conn)?;

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Name", "Type", "Status", "Total", "Processed", "Matched", "Failed", "Success",
    ]);
    for b in batches {
        table.add_row(vec![
            Cell::new(b.id),
            Cell::new(&b.name),
            Cell::new(b.batch_type.as_str()),
            Cell::new(b.status.as_str()),
            Cell::new(b.total_payments),
            Cell::new(b.processed_payments),
            Cell::new(b.successful_matches),
            Cell::new(b.failed_matches),
            Cell::new(pct(b.success_rate())),
        ]);
    }
    println!("Batches\n{table}");
    Ok(())
}
