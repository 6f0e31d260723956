// ABOUTME: Reads a database/table directory tree back into a mysqldump stream
// ABOUTME: Emits extended INSERTs in size-bounded chunks or one INSERT per row

use super::{chunkify, read_init, Database, DatabasePaths, Entity, Table, TablePaths};
use crate::limits::Limits;
use crate::sql;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Default upper bound on the size of one extended INSERT statement
///
/// Kept a little under the 1MB `max_allowed_packet` the mysql client ships with.
pub const MAX_EXTENDED_INSERT: usize = 1_000_000 - 1024;

const ROW_SEPARATOR: &str = ",\n";

const PROLOGUE: &str = "\
/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;
/*!40101 SET @OLD_CHARACTER_SET_RESULTS=@@CHARACTER_SET_RESULTS */;
/*!40101 SET @OLD_COLLATION_CONNECTION=@@COLLATION_CONNECTION */;
/*!40101 SET NAMES utf8 */;
/*!40103 SET @OLD_TIME_ZONE=@@TIME_ZONE */;
/*!40103 SET TIME_ZONE='+00:00' */;
/*!40014 SET @OLD_UNIQUE_CHECKS=@@UNIQUE_CHECKS, UNIQUE_CHECKS=0 */;
/*!40014 SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;
/*!40101 SET @OLD_SQL_MODE=@@SQL_MODE, SQL_MODE='NO_AUTO_VALUE_ON_ZERO' */;
/*!40111 SET @OLD_SQL_NOTES=@@SQL_NOTES, SQL_NOTES=0 */;
";

const POSTLUDE: &str = "\
/*!40103 SET TIME_ZONE=@OLD_TIME_ZONE */;
/*!40101 SET SQL_MODE=@OLD_SQL_MODE */;
/*!40014 SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS */;
/*!40014 SET UNIQUE_CHECKS=@OLD_UNIQUE_CHECKS */;
/*!40101 SET CHARACTER_SET_CLIENT=@OLD_CHARACTER_SET_CLIENT */;
/*!40101 SET CHARACTER_SET_RESULTS=@OLD_CHARACTER_SET_RESULTS */;
/*!40101 SET COLLATION_CONNECTION=@OLD_COLLATION_CONNECTION */;
/*!40111 SET SQL_NOTES=@OLD_SQL_NOTES */;
";

/// Output toggles for a read pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Emit `DROP DATABASE IF EXISTS` before each database
    pub add_drop_database: bool,
    /// Emit one INSERT per row instead of extended INSERTs
    pub skip_extended_insert: bool,
    /// Upper bound in bytes for one extended INSERT statement
    pub max_extended_insert: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            add_drop_database: false,
            skip_extended_insert: false,
            max_extended_insert: MAX_EXTENDED_INSERT,
        }
    }
}

/// Counts reported at the end of a read pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub databases: usize,
    pub tables: usize,
    pub rows: usize,
    pub inserts: usize,
}

struct StoredDatabase {
    database: Database,
    init: String,
}

struct StoredTable {
    table: Table,
    init: String,
}

/// Sorted subdirectories of `dir`; other entries are skipped with a warning
fn list_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory {}", dir.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_dir() {
            tracing::warn!("Ignoring non-directory entry {}", path.display());
            continue;
        }
        dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
    }

    dirs.sort();
    Ok(dirs)
}

fn load_databases(indir: &Path, limits: &Limits) -> Result<Vec<StoredDatabase>> {
    let mut databases = Vec::new();

    for (_, path) in list_dirs(indir)? {
        let paths = DatabasePaths::new(path);
        let init = read_init(&paths.init())?;
        let name = sql::statement_name(&init)
            .with_context(|| format!("Invalid schema file {}", paths.init().display()))?;

        if !limits.includes_database(&name) {
            tracing::debug!("Skipping database '{}' (excluded by limits)", name);
            continue;
        }

        databases.push(StoredDatabase {
            database: Database { name, paths },
            init,
        });
    }

    Ok(databases)
}

fn load_tables(database: &Database, limits: &Limits) -> Result<Vec<StoredTable>> {
    let tables_dir = database.paths.tables();
    if !tables_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut tables = Vec::new();
    for (_, path) in list_dirs(&tables_dir)? {
        let paths = TablePaths::new(path);
        let init = read_init(&paths.init())?;
        let name = sql::statement_name(&init)
            .with_context(|| format!("Invalid schema file {}", paths.init().display()))?;

        if !limits.includes_table(&database.name, &name) {
            tracing::debug!(
                "Skipping table '{}/{}' (excluded by limits)",
                database.name,
                name
            );
            continue;
        }

        tables.push(StoredTable {
            table: Table {
                name,
                database: database.name.clone(),
                paths,
            },
            init,
        });
    }

    Ok(tables)
}

/// Lists the databases of a tree that pass `limits`, in emission order
pub fn databases(indir: &Path, limits: &Limits) -> Result<Vec<Database>> {
    Ok(load_databases(indir, limits)?
        .into_iter()
        .map(|stored| stored.database)
        .collect())
}

/// Lists the tables of a database that pass `limits`, in emission order
pub fn tables(database: &Database, limits: &Limits) -> Result<Vec<Table>> {
    Ok(load_tables(database, limits)?
        .into_iter()
        .map(|stored| stored.table)
        .collect())
}

/// Streams the row payloads of a table; a missing rows file means no rows
fn open_rows(paths: &TablePaths) -> Result<Option<BufReader<File>>> {
    let path = paths.rows();
    match File::open(&path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to open rows file {}", path.display())),
    }
}

fn write_lock<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    writeln!(out, "LOCK TABLES `{}` WRITE;", name)?;
    writeln!(out, "/*!40000 ALTER TABLE `{}` DISABLE KEYS */;", name)
}

fn write_unlock<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    writeln!(out, "/*!40000 ALTER TABLE `{}` ENABLE KEYS */;", name)?;
    writeln!(out, "UNLOCK TABLES;")?;
    writeln!(out)
}

struct TableWriter<'a, W> {
    out: &'a mut W,
    options: &'a ReadOptions,
    summary: &'a mut ReadSummary,
}

impl<W: Write> TableWriter<'_, W> {
    fn write_table(&mut self, stored: &StoredTable) -> Result<()> {
        let name = &stored.table.name;

        writeln!(self.out, "DROP TABLE IF EXISTS `{}`;", name)?;
        writeln!(self.out, "SET @saved_cs_client     = @@character_set_client;")?;
        writeln!(self.out, "SET character_set_client = utf8;")?;
        writeln!(self.out, "{}", stored.init.trim_end())?;
        writeln!(self.out, "SET character_set_client = @saved_cs_client;")?;
        writeln!(self.out)?;

        let Some(rows_file) = open_rows(&stored.table.paths)? else {
            return Ok(());
        };

        let rows_path = stored.table.paths.rows();
        let mut read_error = None;
        let rows = rows_file.lines().map_while(|line| match line {
            Ok(mut row) => {
                if row.ends_with('\r') {
                    row.pop();
                }
                Some(row)
            }
            Err(e) => {
                read_error = Some(e);
                None
            }
        });

        let written = if self.options.skip_extended_insert {
            self.write_rows(name, rows)?
        } else {
            self.write_chunks(name, rows)?
        };

        if let Some(e) = read_error {
            return Err(e)
                .with_context(|| format!("Failed to read rows file {}", rows_path.display()));
        }

        if written > 0 {
            write_unlock(self.out, name)?;
        }

        Ok(())
    }

    fn write_rows(&mut self, name: &str, rows: impl Iterator<Item = String>) -> Result<usize> {
        let mut count = 0;
        for row in rows {
            if count == 0 {
                write_lock(self.out, name)?;
            }
            writeln!(self.out, "INSERT INTO `{}` VALUES ({});", name, row)?;
            count += 1;
        }

        self.summary.rows += count;
        self.summary.inserts += count;
        Ok(count)
    }

    fn write_chunks(&mut self, name: &str, rows: impl Iterator<Item = String>) -> Result<usize> {
        // Each tuple goes on its own line; the header line counts towards the limit too
        let header = format!("INSERT INTO `{}` VALUES \n", name);
        let suffix = ";";
        let max_len = self
            .options
            .max_extended_insert
            .saturating_sub(header.len() + suffix.len());

        let mut row_count = 0;
        let tuples = rows.map(|row| {
            row_count += 1;
            format!("({})", row)
        });

        let mut chunks = 0;
        for chunk in chunkify(tuples, ROW_SEPARATOR, max_len) {
            if chunks == 0 {
                write_lock(self.out, name)?;
            }
            write!(self.out, "{}", header)?;
            writeln!(self.out, "{}{}", chunk, suffix)?;
            chunks += 1;
        }

        if chunks > 0 {
            writeln!(self.out, "/* CHUNKS: {} */", chunks)?;
        }

        self.summary.rows += row_count;
        self.summary.inserts += chunks;
        Ok(chunks)
    }
}

/// Serializes the tree under `indir` as a dump stream into `out`
///
/// Databases and tables are visited in sorted directory order and filtered
/// through `limits` by the names found in their schema files. The stream is
/// wrapped in the session save/restore block mysqldump uses, so it can be
/// piped straight into the mysql client.
///
/// # Errors
///
/// Returns an error if the tree cannot be listed or read, a schema file has
/// no recognizable name, or writing to `out` fails.
///
/// # Examples
///
/// ```no_run
/// # use mysql_dumpfs::{limits::Limits, tree};
/// # fn example() -> anyhow::Result<()> {
/// let options = tree::ReadOptions {
///     add_drop_database: true,
///     ..Default::default()
/// };
/// let stdout = std::io::stdout();
/// let mut out = stdout.lock();
/// tree::read(
///     std::path::Path::new("/var/backups/mysql"),
///     &Limits::none(),
///     &options,
///     &mut out,
///     |_| {},
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn read<W, F>(
    indir: &Path,
    limits: &Limits,
    options: &ReadOptions,
    out: &mut W,
    mut callback: F,
) -> Result<ReadSummary>
where
    W: Write,
    F: FnMut(Entity<'_>),
{
    let mut summary = ReadSummary::default();

    writeln!(out, "{}", PROLOGUE)?;

    for stored in load_databases(indir, limits)? {
        let database = &stored.database;
        callback(Entity::Database(database));
        summary.databases += 1;

        if options.add_drop_database {
            writeln!(out, "/*!40000 DROP DATABASE IF EXISTS `{}`*/;", database.name)?;
        }
        writeln!(out, "{}", stored.init.trim_end())?;
        writeln!(out, "USE `{}`;", database.name)?;
        writeln!(out)?;

        for table in load_tables(database, limits)? {
            callback(Entity::Table(&table.table));
            summary.tables += 1;

            TableWriter {
                out: &mut *out,
                options,
                summary: &mut summary,
            }
            .write_table(&table)?;
        }
    }

    writeln!(out, "{}", POSTLUDE)?;
    out.flush().context("Failed to flush dump output")?;

    tracing::debug!(
        "Read pass done: {} databases, {} tables, {} rows in {} INSERT statements",
        summary.databases,
        summary.tables,
        summary.rows,
        summary.inserts
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ensure_dir, write_init};
    use tempfile::tempdir;

    fn add_database(root: &Path, dir: &str, name: &str) -> DatabasePaths {
        let paths = DatabasePaths::new(root.join(dir));
        ensure_dir(paths.path()).unwrap();
        write_init(&paths.init(), &format!("CREATE DATABASE `{}`;", name)).unwrap();
        paths
    }

    fn add_table(db: &DatabasePaths, name: &str, rows: &[&str]) {
        let paths = db.table(name);
        ensure_dir(paths.path()).unwrap();
        write_init(
            &paths.init(),
            &format!("CREATE TABLE `{}` (\n  `id` int(11) NOT NULL\n);", name),
        )
        .unwrap();
        let mut content = String::new();
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(paths.rows(), content).unwrap();
    }

    fn read_to_string(root: &Path, limits: &Limits, options: &ReadOptions) -> String {
        let mut out = Vec::new();
        read(root, limits, options, &mut out, |_| {}).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_emits_prologue_schema_and_postlude() {
        let dir = tempdir().unwrap();
        let db = add_database(dir.path(), "shop", "shop");
        add_table(&db, "orders", &["1", "2"]);

        let dump = read_to_string(dir.path(), &Limits::none(), &ReadOptions::default());

        assert!(dump.starts_with("/*!40101 SET @OLD_CHARACTER_SET_CLIENT"));
        assert!(dump.contains("CREATE DATABASE `shop`;\nUSE `shop`;\n"));
        assert!(dump.contains(
            "DROP TABLE IF EXISTS `orders`;\n\
             SET @saved_cs_client     = @@character_set_client;\n\
             SET character_set_client = utf8;\n\
             CREATE TABLE `orders` (\n  `id` int(11) NOT NULL\n);\n\
             SET character_set_client = @saved_cs_client;\n"
        ));
        assert!(dump.trim_end().ends_with("/*!40111 SET SQL_NOTES=@OLD_SQL_NOTES */;"));
        assert_eq!(dump.matches("SET @OLD_SQL_NOTES").count(), 1);
        assert!(!dump.contains("DROP DATABASE"));
    }

    #[test]
    fn test_extended_insert_bracketing() {
        let dir = tempdir().unwrap();
        let db = add_database(dir.path(), "shop", "shop");
        add_table(&db, "orders", &["1,'a'", "2,'b'"]);

        let dump = read_to_string(dir.path(), &Limits::none(), &ReadOptions::default());

        assert!(dump.contains(
            "LOCK TABLES `orders` WRITE;\n\
             /*!40000 ALTER TABLE `orders` DISABLE KEYS */;\n\
             INSERT INTO `orders` VALUES \n\
             (1,'a'),\n(2,'b');\n\
             /* CHUNKS: 1 */\n\
             /*!40000 ALTER TABLE `orders` ENABLE KEYS */;\n\
             UNLOCK TABLES;\n"
        ));
    }

    #[test]
    fn test_extended_insert_respects_statement_limit() {
        let dir = tempdir().unwrap();
        let db = add_database(dir.path(), "shop", "shop");
        add_table(&db, "t", &["1", "2", "3", "4"]);

        // header "INSERT INTO `t` VALUES \n" is 24 bytes, suffix 1: chunks get 8 bytes
        let options = ReadOptions {
            max_extended_insert: 33,
            ..Default::default()
        };
        let dump = read_to_string(dir.path(), &Limits::none(), &options);

        assert_eq!(dump.matches("INSERT INTO `t` VALUES \n").count(), 2);
        assert!(dump.contains("(1),\n(2);\n"));
        assert!(dump.contains("(3),\n(4);\n"));
        assert!(dump.contains("/* CHUNKS: 2 */"));
        assert_eq!(dump.matches("LOCK TABLES `t` WRITE;").count(), 1);
    }

    #[test]
    fn test_row_by_row_inserts() {
        let dir = tempdir().unwrap();
        let db = add_database(dir.path(), "shop", "shop");
        add_table(&db, "orders", &["1,'a'", "2,'b'"]);

        let options = ReadOptions {
            skip_extended_insert: true,
            ..Default::default()
        };
        let mut out = Vec::new();
        let summary = read(dir.path(), &Limits::none(), &options, &mut out, |_| {}).unwrap();
        let dump = String::from_utf8(out).unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.inserts, 2);
        assert!(dump.contains(
            "/*!40000 ALTER TABLE `orders` DISABLE KEYS */;\n\
             INSERT INTO `orders` VALUES (1,'a');\n\
             INSERT INTO `orders` VALUES (2,'b');\n\
             /*!40000 ALTER TABLE `orders` ENABLE KEYS */;\n"
        ));
        assert!(!dump.contains("CHUNKS"));
    }

    #[test]
    fn test_empty_table_emits_only_schema() {
        let dir = tempdir().unwrap();
        let db = add_database(dir.path(), "shop", "shop");
        add_table(&db, "empty", &[]);

        for skip_extended_insert in [false, true] {
            let options = ReadOptions {
                skip_extended_insert,
                ..Default::default()
            };
            let dump = read_to_string(dir.path(), &Limits::none(), &options);

            assert!(dump.contains("CREATE TABLE `empty`"));
            assert!(!dump.contains("INSERT INTO"));
            assert!(!dump.contains("LOCK TABLES"));
            assert!(!dump.contains("CHUNKS"));
        }
    }

    #[test]
    fn test_add_drop_database() {
        let dir = tempdir().unwrap();
        add_database(dir.path(), "shop", "shop");

        let options = ReadOptions {
            add_drop_database: true,
            ..Default::default()
        };
        let dump = read_to_string(dir.path(), &Limits::none(), &options);

        assert!(dump.contains("/*!40000 DROP DATABASE IF EXISTS `shop`*/;\nCREATE DATABASE `shop`;"));
    }

    #[test]
    fn test_names_come_from_schema_not_directory() {
        let dir = tempdir().unwrap();
        let db = add_database(dir.path(), "renamed_dir", "shop");
        add_table(&db, "orders", &[]);

        let limits = Limits::new(&["-shop"]).unwrap();
        let dump = read_to_string(dir.path(), &limits, &ReadOptions::default());
        assert!(!dump.contains("CREATE DATABASE"));

        let dump = read_to_string(dir.path(), &Limits::none(), &ReadOptions::default());
        assert!(dump.contains("USE `shop`;"));
    }

    #[test]
    fn test_limits_filter_databases_and_tables() {
        let dir = tempdir().unwrap();
        let shop = add_database(dir.path(), "shop", "shop");
        add_table(&shop, "orders", &["1"]);
        add_table(&shop, "secrets", &["2"]);
        let blog = add_database(dir.path(), "blog", "blog");
        add_table(&blog, "posts", &["3"]);

        let limits = Limits::new(&["shop", "-shop/secrets"]).unwrap();
        let mut seen = Vec::new();
        let mut out = Vec::new();
        read(
            dir.path(),
            &limits,
            &ReadOptions::default(),
            &mut out,
            |entity| seen.push(entity.name()),
        )
        .unwrap();
        let dump = String::from_utf8(out).unwrap();

        assert_eq!(seen, vec!["shop", "shop/orders"]);
        assert!(!dump.contains("secrets"));
        assert!(!dump.contains("blog"));
    }

    #[test]
    fn test_enumeration_is_sorted_and_skips_files() {
        let dir = tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            add_database(dir.path(), name, name);
        }
        fs::write(dir.path().join("README"), "not a database").unwrap();

        let names: Vec<String> = databases(dir.path(), &Limits::none())
            .unwrap()
            .into_iter()
            .map(|db| db.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_database_without_tables_dir() {
        let dir = tempdir().unwrap();
        add_database(dir.path(), "bare", "bare");

        let mut out = Vec::new();
        let summary = read(
            dir.path(),
            &Limits::none(),
            &ReadOptions::default(),
            &mut out,
            |_| {},
        )
        .unwrap();

        assert_eq!(summary.databases, 1);
        assert_eq!(summary.tables, 0);
    }

    #[test]
    fn test_missing_rows_file_means_no_rows() {
        let dir = tempdir().unwrap();
        let db = add_database(dir.path(), "shop", "shop");
        add_table(&db, "orders", &[]);
        fs::remove_file(db.table("orders").rows()).unwrap();

        let dump = read_to_string(dir.path(), &Limits::none(), &ReadOptions::default());
        assert!(dump.contains("CREATE TABLE `orders`"));
        assert!(!dump.contains("INSERT INTO"));
    }

    #[test]
    fn test_missing_schema_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("broken")).unwrap();

        let mut out = Vec::new();
        let result = read(
            dir.path(),
            &Limits::none(),
            &ReadOptions::default(),
            &mut out,
            |_| {},
        );
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read schema file"));
    }
}
