use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::{BursarError, Result};
use crate::fmt::{money, pct};
use crate::models::ThresholdContext;
use crate::settings::db_path;
use crate::thresholds;

pub fn add(
    context: &str,
    absolute_limit: f64,
    percentage_limit: Option<f64>,
    effective_date: Option<String>,
) -> Result<()> {
    let context = ThresholdContext::parse(context)
        .ok_or_else(|| BursarError::Other(format!("unknown threshold context: {context}")))?;
    let effective = match effective_date {
        Some(d) => d,
        None => chrono::Local::now().format("%Y-%m-%d").to_string(),
    };

    let conn = get_connection(&db_path())?;
    thresholds::add(&conn, context, absolute_limit, percentage_limit, &effective)?;
    println!(
        "Added {} threshold: {} effective {effective}",
        context.as_str(),
        money(absolute_limit)
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let rows = thresholds::list(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Context", "Absolute", "Percentage", "Effective"]);
    for t in rows {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.context.as_str()),
            Cell::new(money(t.absolute_limit)),
            Cell::new(t.percentage_limit.map(pct).unwrap_or_default()),
            Cell::new(&t.effective_date),
        ]);
    }
    println!("Materiality thresholds\n{table}");
    Ok(())
}
