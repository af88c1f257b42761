//! Ordered SQL migration runner
//!
//! Applies every `*.sql` file of a directory in file-name order. A file that
//! fails because its objects already exist is recorded as skipped, so the
//! whole directory can be re-applied safely. Any other failure stops the run.

use crate::error::{Result, StorageError};
use sqlx::postgres::PgPool;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// SQLSTATE codes meaning "this object is already there"
const ALREADY_EXISTS_CODES: [&str; 5] = [
    "42P07", // duplicate_table (also indexes, sequences, views)
    "42710", // duplicate_object
    "42P06", // duplicate_schema
    "42701", // duplicate_column
    "42723", // duplicate_function
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied,
    Skipped { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Whether a database error only says the migration was applied before
pub fn is_already_applied(code: Option<&str>, message: &str) -> bool {
    code.is_some_and(|c| ALREADY_EXISTS_CODES.contains(&c))
        || message.to_ascii_lowercase().contains("already exists")
}

fn skip_reason(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if is_already_applied(db.code().as_deref(), db.message()) => {
            Some(db.message().to_string())
        }
        _ => None,
    }
}

/// `*.sql` files in `dir`, sorted by file name
pub fn discover(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_sql = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
        if !path.is_file() || !is_sql {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            warn!("Skipping migration with non UTF-8 name: {}", path.display());
            continue;
        };
        files.push(MigrationFile { name, path });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Apply one file
pub async fn apply(pool: &PgPool, file: &MigrationFile) -> Result<MigrationOutcome> {
    let sql = std::fs::read_to_string(&file.path)?;

    match sqlx::raw_sql(&sql).execute(pool).await {
        Ok(_) => Ok(MigrationOutcome::Applied),
        Err(e) => match skip_reason(&e) {
            Some(reason) => Ok(MigrationOutcome::Skipped { reason }),
            None => Err(StorageError::Migration {
                file: file.name.clone(),
                source: e,
            }),
        },
    }
}

/// Apply every migration in `dir`, stopping at the first real failure
pub async fn run_migrations(pool: &PgPool, dir: &Path) -> Result<MigrationReport> {
    let files = discover(dir)?;
    info!("Found {} migration files in {}", files.len(), dir.display());

    let mut report = MigrationReport::default();
    for file in &files {
        match apply(pool, file).await {
            Ok(MigrationOutcome::Applied) => {
                info!("✅ Applied {}", file.name);
                report.applied.push(file.name.clone());
            }
            Ok(MigrationOutcome::Skipped { reason }) => {
                info!("⏭️  Skipped {} ({})", file.name, reason);
                report.skipped.push(file.name.clone());
            }
            Err(e) => {
                error!("Migration {} failed: {}", file.name, e);
                return Err(e);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_classification() {
        assert!(is_already_applied(Some("42P07"), "relation \"signals\" already exists"));
        assert!(is_already_applied(Some("42710"), "type \"signal_status\" exists"));
        assert!(is_already_applied(None, "index \"idx_signals_status\" ALREADY EXISTS"));

        assert!(!is_already_applied(Some("42601"), "syntax error at or near \"CREAT\""));
        assert!(!is_already_applied(Some("23505"), "duplicate key value violates unique constraint"));
        assert!(!is_already_applied(None, "connection refused"));
    }

    #[test]
    fn test_discover_orders_sql_files_by_name() {
        let dir = std::env::temp_dir().join(format!("signal-desk-migrations-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["010_indexes.sql", "002_logs.sql", "001_signals.sql", "README.md"] {
            std::fs::write(dir.join(name), "SELECT 1;").unwrap();
        }
        std::fs::create_dir_all(dir.join("003_dir.sql")).unwrap();

        let names: Vec<String> = discover(&dir).unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["001_signals.sql", "002_logs.sql", "010_indexes.sql"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = std::env::temp_dir().join(format!("signal-desk-missing-{}", uuid::Uuid::new_v4()));
        assert!(matches!(discover(&dir), Err(StorageError::Io(_))));
    }

    #[test]
    fn test_shipped_migrations_are_discoverable() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../migrations");
        let files = discover(&dir).unwrap();
        assert!(files.len() >= 3);
        assert_eq!(files[0].name, "001_create_signals.sql");
    }
}
