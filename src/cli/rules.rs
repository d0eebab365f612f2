use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::{BursarError, Result};
use crate::models::Rule;
use crate::rules::{condition_for, rules_by_priority};
use crate::settings::db_path;

pub fn add(
    name: &str,
    rule_type: &str,
    parameters: &str,
    confidence_threshold: i64,
    priority: i64,
) -> Result<()> {
    let conn = get_connection(&db_path())?;

    // Decode once up front so a typo fails here, not silently at match time.
    let probe = Rule {
        id: 0,
        name: name.to_string(),
        rule_type: rule_type.to_string(),
        parameters: parameters.to_string(),
        confidence_threshold,
        priority,
        is_active: true,
        times_applied: 0,
    };
    condition_for(&probe)?;

    conn.execute(
        "INSERT INTO rules (name, rule_type, parameters, confidence_threshold, priority) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![name, rule_type, parameters, confidence_threshold, priority],
    )?;
    println!("Added rule: '{name}' ({rule_type}, priority {priority})");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let rules = rules_by_priority(&conn)?;

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Name", "Type", "Parameters", "Threshold", "Priority", "Applied",
    ]);
    for r in rules {
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(&r.name),
            Cell::new(&r.rule_type),
            Cell::new(&r.parameters),
            Cell::new(r.confidence_threshold),
            Cell::new(r.priority),
            Cell::new(r.times_applied),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let conn = get_connection(&db_path())?;

    let row: std::result::Result<(String, i64), _> = conn.query_row(
        "SELECT name, is_active FROM rules WHERE id = ?1",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    );

    match row {
        Err(_) => Err(BursarError::Other(format!("No rule with ID {id}"))),
        Ok((_, 0)) => Err(BursarError::Other(format!("Rule {id} is already inactive"))),
        Ok((name, _)) => {
            conn.execute("UPDATE rules SET is_active = 0 WHERE id = ?1", [id])?;
            println!("Deleted rule {id}: '{name}'");
            Ok(())
        }
    }
}
