// ABOUTME: Filesystem form of a dump: one directory per database, one per table
// ABOUTME: Shared path layout and entity types used by the writer and the reader

pub mod chunk;
pub mod reader;
pub mod writer;

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use chunk::{chunkify, Chunks};
pub use reader::{read, ReadOptions, ReadSummary, MAX_EXTENDED_INSERT};
pub use writer::{write, WriteSummary};

/// File holding the verbatim CREATE statement of a database or table
pub const INIT_FILE: &str = "init";
/// Directory holding a database's table directories
pub const TABLES_DIR: &str = "tables";
/// File holding one row tuple payload per line
pub const ROWS_FILE: &str = "rows";

/// On-disk layout of a database: `<root>/<name>/{init,tables/}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePaths {
    path: PathBuf,
}

impl DatabasePaths {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> PathBuf {
        self.path.join(INIT_FILE)
    }

    pub fn tables(&self) -> PathBuf {
        self.path.join(TABLES_DIR)
    }

    pub fn table(&self, dir_name: &str) -> TablePaths {
        TablePaths::new(self.tables().join(dir_name))
    }
}

/// On-disk layout of a table: `<db>/tables/<name>/{init,rows}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    path: PathBuf,
}

impl TablePaths {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> PathBuf {
        self.path.join(INIT_FILE)
    }

    pub fn rows(&self) -> PathBuf {
        self.path.join(ROWS_FILE)
    }
}

/// A database in filesystem form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    pub name: String,
    pub paths: DatabasePaths,
}

/// A table in filesystem form, owned by exactly one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub database: String,
    pub paths: TablePaths,
}

impl Table {
    /// `database/table`, the same form limits are written in
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.database, self.name)
    }
}

/// Entity handed to progress callbacks when it is accepted into a pass
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    Database(&'a Database),
    Table(&'a Table),
}

impl Entity<'_> {
    pub fn name(&self) -> String {
        match self {
            Entity::Database(database) => database.name.clone(),
            Entity::Table(table) => table.qualified_name(),
        }
    }
}

/// Validates a database or table name before it becomes a path component
///
/// Names come straight out of dump statements. Anything that would escape
/// the tree or collide with the layout is rejected.
///
/// # Examples
///
/// ```
/// # use mysql_dumpfs::tree::validate_entity_name;
/// assert!(validate_entity_name("wp_posts").is_ok());
/// assert!(validate_entity_name("my-db.v2").is_ok());
/// assert!(validate_entity_name("..").is_err());
/// assert!(validate_entity_name("a/b").is_err());
/// ```
pub fn validate_entity_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Database and table names cannot be empty");
    }

    if name == "." || name == ".." {
        bail!("Name '{}' is not a valid directory name", name);
    }

    if let Some(c) = name.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        bail!(
            "Name '{}' contains invalid character '{}'",
            crate::utils::sanitize_identifier(name),
            c.escape_default()
        );
    }

    Ok(())
}

/// Reads a persisted CREATE statement
pub fn read_init(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))
}

/// Replaces a persisted CREATE statement atomically
///
/// The statement is written to a temp file next to the target and renamed
/// over it, so a reader never sees a half-written `init`.
pub fn write_init(path: &Path, sql: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp schema file in {}", parent.display()))?;

    writeln!(tmp, "{}", sql)
        .with_context(|| format!("Failed to write schema file {}", path.display()))?;

    tmp.persist(path)
        .with_context(|| format!("Failed to persist schema file {}", path.display()))?;

    Ok(())
}

/// Creates a directory (and parents) unless it already exists
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout_paths() {
        let db = DatabasePaths::new("/backup/shop");
        assert_eq!(db.init(), PathBuf::from("/backup/shop/init"));
        assert_eq!(db.tables(), PathBuf::from("/backup/shop/tables"));

        let table = db.table("orders");
        assert_eq!(table.path(), Path::new("/backup/shop/tables/orders"));
        assert_eq!(table.init(), PathBuf::from("/backup/shop/tables/orders/init"));
        assert_eq!(table.rows(), PathBuf::from("/backup/shop/tables/orders/rows"));
    }

    #[test]
    fn test_entity_names() {
        let database = Database {
            name: "shop".to_string(),
            paths: DatabasePaths::new("/backup/shop"),
        };
        let table = Table {
            name: "orders".to_string(),
            database: "shop".to_string(),
            paths: database.paths.table("orders"),
        };

        assert_eq!(Entity::Database(&database).name(), "shop");
        assert_eq!(Entity::Table(&table).name(), "shop/orders");
    }

    #[test]
    fn test_validate_entity_name_rejects_traversal() {
        for name in ["", ".", "..", "../etc", "a/b", "a\\b", "nul\0byte"] {
            assert!(
                validate_entity_name(name).is_err(),
                "Unsafe name should be rejected: {:?}",
                name
            );
        }
    }

    #[test]
    fn test_write_init_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(INIT_FILE);

        write_init(&path, "CREATE DATABASE `a`;").unwrap();
        write_init(&path, "CREATE DATABASE `b`;").unwrap();

        assert_eq!(read_init(&path).unwrap(), "CREATE DATABASE `b`;\n");
    }
}
