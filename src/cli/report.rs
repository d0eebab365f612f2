use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::money;
use crate::reports;
use crate::settings::db_path;

pub fn variance(date: Option<String>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let summary = reports::variance_summary(&conn, date.as_deref())?;

    let mut table = Table::new();
    table.set_header(vec!["Adjustment type", "Count", "Total variance"]);
    for t in &summary.by_type {
        table.add_row(vec![
            Cell::new(&t.adjustment_type),
            Cell::new(t.count),
            Cell::new(money(t.total_variance)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL".bold()),
        Cell::new(summary.total_adjustments),
        Cell::new(money(summary.total_variance)),
    ]);
    println!("Variance summary\n{table}");

    if !summary.top.is_empty() {
        let mut top = Table::new();
        top.set_header(vec!["ID", "Type", "Payment", "Variance", "Description"]);
        for a in &summary.top {
            top.add_row(vec![
                Cell::new(a.id),
                Cell::new(&a.adjustment_type),
                Cell::new(a.payment_id),
                Cell::new(money(a.variance)),
                Cell::new(a.description.as_deref().unwrap_or("")),
            ]);
        }
        println!("\nLargest variances\n{top}");
    }

    if summary.pending_approval > 0 {
        println!(
            "\n{}",
            format!("{} adjustment(s) awaiting approval", summary.pending_approval)
                .yellow()
                .bold()
        );
    }
    for rec in &summary.recommendations {
        println!("  - {rec}");
    }
    Ok(())
}

pub fn unreconciled() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let rows = reports::unreconciled(&conn)?;

    if rows.is_empty() {
        println!("{}", "All payments reconciled.".green());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Payment", "Student", "Term", "Amount", "Received", "Status", "Detail",
    ]);
    for r in &rows {
        let detail = r
            .error_category
            .clone()
            .or_else(|| r.notes.clone())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(r.payment_id),
            Cell::new(&r.student),
            Cell::new(&r.term),
            Cell::new(money(r.amount)),
            Cell::new(&r.received_date),
            Cell::new(&r.status),
            Cell::new(detail),
        ]);
    }
    println!("Unreconciled payments ({})\n{table}", rows.len());
    Ok(())
}
