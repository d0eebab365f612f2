use colored::Colorize;

use crate::db::get_connection;
use crate::engine;
use crate::error::Result;
use crate::fmt::{money, pct};
use crate::lookups::BatchCache;
use crate::settings::{db_path, load_settings};

pub fn run(payment_id: i64) -> Result<()> {
    let settings = load_settings();
    let conn = get_connection(&db_path())?;
    let mut cache = BatchCache::new();
    let row = engine::reconcile(
        &conn,
        &mut cache,
        payment_id,
        None,
        settings.record_minor_variance,
    )?;

    let status = if row.status.is_success() {
        row.status.as_str().green().bold()
    } else {
        row.status.as_str().yellow().bold()
    };
    println!("Payment {payment_id}: {status}");
    if let Some(method) = &row.pricing_method {
        println!("  Method:     {method}");
    }
    if let Some(score) = row.confidence_score {
        println!(
            "  Confidence: {score} ({})",
            row.confidence_level.as_deref().unwrap_or("-")
        );
    }
    if row.variance_amount > 0.0 {
        println!(
            "  Variance:   {} ({})",
            money(row.variance_amount),
            pct(row.variance_percentage)
        );
    }
    if let Some(category) = &row.error_category {
        println!(
            "  Error:      {category}: {}",
            row.error_details.as_deref().unwrap_or("")
        );
    }
    if let Some(notes) = &row.notes {
        println!("  Notes:      {notes}");
    }
    Ok(())
}
