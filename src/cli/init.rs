use crate::db::{get_connection, init_db, set_metadata};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>, institution: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(name) = &institution {
        settings.institution = name.clone();
    }
    std::fs::create_dir_all(&settings.data_dir)?;
    save_settings(&settings)?;

    let db_path = std::path::Path::new(&settings.data_dir).join("bursar.db");
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    if let Some(name) = &institution {
        set_metadata(&conn, "institution", name)?;
    }

    println!("Initialized database at {}", db_path.display());
    println!("Next: run `bursar demo` for sample data, or load your records and `bursar batch run --type initial`.");
    Ok(())
}
