use comfy_table::{Cell, Table};

use crate::adjustments;
use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::money;
use crate::settings::db_path;

pub fn list(pending: bool) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let rows = adjustments::list(&conn, pending)?;

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Type", "Payment", "Expected", "Observed", "Variance", "Approval",
    ]);
    for a in &rows {
        let approval = if a.awaiting_approval() {
            "pending".to_string()
        } else if let Some(by) = &a.approved_by {
            format!("approved by {by}")
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(a.id),
            Cell::new(&a.adjustment_type),
            Cell::new(a.payment_id),
            Cell::new(money(a.original_amount)),
            Cell::new(money(a.adjusted_amount)),
            Cell::new(money(a.variance)),
            Cell::new(approval),
        ]);
    }
    let title = if pending { "Adjustments awaiting approval" } else { "Adjustments" };
    println!("{title}\n{table}");
    Ok(())
}

pub fn approve(id: i64, approver: &str) -> Result<()> {
    let conn = get_connection(&db_path())?;
    adjustments::approve(&conn, id, approver)?;
    println!("Approved adjustment {id} as {approver}");
    Ok(())
}
