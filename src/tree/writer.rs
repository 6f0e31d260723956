// ABOUTME: Writes a mysqldump stream out as a database/table directory tree
// ABOUTME: Single streaming pass with limits applied per statement

use super::{ensure_dir, validate_entity_name, write_init, Database, DatabasePaths, Entity, Table};
use crate::limits::Limits;
use crate::sql::{self, StatementKind};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

/// Counts reported at the end of a write pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub statements: usize,
    pub databases: usize,
    pub tables: usize,
    pub rows: usize,
}

/// Table currently receiving rows, with its open rows file
struct OpenTable {
    table: Table,
    rows: BufWriter<File>,
}

impl OpenTable {
    fn create(database: &Database, name: String, sql: &str) -> Result<Self> {
        let paths = database.paths.table(&name);
        ensure_dir(paths.path())?;
        write_init(&paths.init(), sql)?;

        let rows_path = paths.rows();
        let rows = File::create(&rows_path)
            .with_context(|| format!("Failed to create rows file {}", rows_path.display()))?;

        Ok(Self {
            table: Table {
                name,
                database: database.name.clone(),
                paths,
            },
            rows: BufWriter::new(rows),
        })
    }

    fn add_row(&mut self, row: &str) -> Result<()> {
        writeln!(self.rows, "{}", row).with_context(|| {
            format!(
                "Failed to append row to {}",
                self.table.paths.rows().display()
            )
        })
    }

    fn finish(mut self) -> Result<()> {
        self.rows.flush().with_context(|| {
            format!(
                "Failed to flush rows file {}",
                self.table.paths.rows().display()
            )
        })
    }
}

/// Cursor state of a write pass
struct Writer<'a, F> {
    outdir: &'a Path,
    limits: &'a Limits,
    callback: F,
    database: Option<Database>,
    table: Option<OpenTable>,
    summary: WriteSummary,
}

impl<'a, F> Writer<'a, F>
where
    F: FnMut(Entity<'_>),
{
    fn close_table(&mut self) -> Result<()> {
        if let Some(open) = self.table.take() {
            open.finish()?;
        }
        Ok(())
    }

    fn handle(&mut self, statement: &str) -> Result<()> {
        match StatementKind::of(statement) {
            StatementKind::CreateDatabase => self.create_database(statement),
            StatementKind::CreateTable => self.create_table(statement),
            StatementKind::Insert => self.insert(statement),
            StatementKind::Other => Ok(()),
        }
    }

    fn create_database(&mut self, statement: &str) -> Result<()> {
        self.close_table()?;

        let name = sql::statement_name(statement)?;
        if !self.limits.includes_database(&name) {
            tracing::debug!("Skipping database '{}' (excluded by limits)", name);
            self.database = None;
            return Ok(());
        }

        validate_entity_name(&name)
            .with_context(|| format!("Invalid database name in '{}'", sql::preview(statement)))?;

        let paths = DatabasePaths::new(self.outdir.join(&name));
        ensure_dir(paths.path())?;
        write_init(&paths.init(), statement)?;

        tracing::debug!("Writing database '{}' to {}", name, paths.path().display());

        let database = Database { name, paths };
        self.summary.databases += 1;
        (self.callback)(Entity::Database(&database));
        self.database = Some(database);
        Ok(())
    }

    fn create_table(&mut self, statement: &str) -> Result<()> {
        self.close_table()?;

        let Some(database) = self.database.as_ref() else {
            return Ok(());
        };

        let name = sql::statement_name(statement)?;
        validate_entity_name(&name)
            .with_context(|| format!("Invalid table name in '{}'", sql::preview(statement)))?;

        // Schema is kept even for excluded tables; only their rows are withheld.
        let open = OpenTable::create(database, name, statement)?;

        if !self.limits.includes_table(&database.name, &open.table.name) {
            tracing::debug!(
                "Skipping rows of table '{}' (excluded by limits)",
                open.table.qualified_name()
            );
            return open.finish();
        }

        self.summary.tables += 1;
        (self.callback)(Entity::Table(&open.table));
        self.table = Some(open);
        Ok(())
    }

    fn insert(&mut self, statement: &str) -> Result<()> {
        if self.database.is_none() {
            return Ok(());
        }
        let Some(open) = self.table.as_mut() else {
            return Ok(());
        };

        let target = sql::statement_name(statement)?;
        if target != open.table.name {
            bail!(
                "Malformed dump: INSERT into '{}' while table '{}' is open",
                crate::utils::sanitize_identifier(&target),
                open.table.qualified_name()
            );
        }

        for row in sql::insert_rows(statement)? {
            open.add_row(row)?;
            self.summary.rows += 1;
        }
        Ok(())
    }
}

/// Writes a dump stream into `outdir` as a directory tree
///
/// Databases and tables are created as their CREATE statements stream by;
/// rows are appended to the table most recently created. Excluded databases
/// get no directory at all. Excluded tables of an included database keep
/// their schema but never receive rows.
///
/// Running again over an existing tree reuses its directories, overwrites
/// schema files and truncates rows of every table seen again.
///
/// # Errors
///
/// Returns an error if the stream cannot be read, a statement is malformed,
/// an INSERT targets a table other than the open one, or the tree cannot be
/// written. Partially written output is left in place.
///
/// # Examples
///
/// ```no_run
/// # use mysql_dumpfs::{limits::Limits, tree};
/// # fn example() -> anyhow::Result<()> {
/// let dump = std::io::BufReader::new(std::fs::File::open("all.sql")?);
/// let limits = Limits::new(&["shop", "-shop/sessions"])?;
/// tree::write(dump, std::path::Path::new("/var/backups/mysql"), &limits, |entity| {
///     println!("{}", entity.name())
/// })?;
/// # Ok(())
/// # }
/// ```
pub fn write<R, F>(input: R, outdir: &Path, limits: &Limits, callback: F) -> Result<WriteSummary>
where
    R: BufRead,
    F: FnMut(Entity<'_>),
{
    ensure_dir(outdir)?;

    let mut writer = Writer {
        outdir,
        limits,
        callback,
        database: None,
        table: None,
        summary: WriteSummary::default(),
    };

    for statement in sql::statements(input) {
        let statement = statement?;
        writer.summary.statements += 1;
        writer.handle(sql::strip_leading_comments(&statement))?;
    }

    writer.close_table()?;

    tracing::debug!(
        "Write pass done: {} statements, {} databases, {} tables, {} rows",
        writer.summary.statements,
        writer.summary.databases,
        writer.summary.tables,
        writer.summary.rows
    );

    Ok(writer.summary)
}
