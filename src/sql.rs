// ABOUTME: Statement splitter and narrow pattern matching for mysqldump output
// ABOUTME: Handles only CREATE DATABASE, CREATE TABLE and INSERT INTO statement shapes

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::io::BufRead;
use std::sync::OnceLock;

/// Kind of dump statement the transcoder cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateDatabase,
    CreateTable,
    Insert,
    Other,
}

impl StatementKind {
    /// Classifies a trimmed statement by its leading keywords
    pub fn of(statement: &str) -> Self {
        if statement.starts_with("CREATE DATABASE") {
            StatementKind::CreateDatabase
        } else if statement.starts_with("CREATE TABLE") {
            StatementKind::CreateTable
        } else if statement.starts_with("INSERT INTO") {
            StatementKind::Insert
        } else {
            StatementKind::Other
        }
    }
}

/// Lazy iterator over top-level statements of a dump stream
///
/// A statement ends at the first line whose trimmed form ends with `;`.
/// Nothing else is tokenized, so a `;` closing a line inside a string literal
/// or comment also ends the statement.
pub struct Statements<R> {
    reader: R,
    line: String,
    done: bool,
}

impl<R: BufRead> Statements<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for Statements<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut statement = String::new();
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    if !statement.trim().is_empty() {
                        tracing::debug!(
                            "Discarding {} trailing bytes without a terminating ';'",
                            statement.len()
                        );
                    }
                    return None;
                }
                Ok(_) => {
                    statement.push_str(&self.line);
                    if statement.trim_end().ends_with(';') {
                        return Some(Ok(statement.trim().to_string()));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e).context("Failed to read dump stream"));
                }
            }
        }
    }
}

/// Splits a dump stream into statements
pub fn statements<R: BufRead>(reader: R) -> Statements<R> {
    Statements::new(reader)
}

/// Drops leading `--` comment lines and blank lines from a statement
///
/// Non-compact dumps put comment banners in front of statements; they carry
/// no schema information and would hide the statement keyword.
pub fn strip_leading_comments(statement: &str) -> &str {
    let mut rest = statement.trim_start();
    while rest.starts_with("--") {
        match rest.find('\n') {
            Some(pos) => rest = rest[pos + 1..].trim_start(),
            None => return "",
        }
    }
    rest
}

fn block_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment pattern"))
}

fn backtick_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]*)`").expect("valid backtick pattern"))
}

fn insert_values() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^.*?VALUES\s*\((.*)\);$").expect("valid VALUES pattern"))
}

/// Extracts the object name from a CREATE DATABASE, CREATE TABLE or INSERT INTO statement
///
/// Block comments are removed, the third whitespace-delimited token is taken
/// and backtick quoting is stripped. A statement terminator glued to the
/// name (`` CREATE DATABASE `a`; ``) is not part of it.
///
/// # Errors
///
/// Returns an error if the statement has fewer than three tokens.
///
/// # Examples
///
/// ```
/// # use mysql_dumpfs::sql::statement_name;
/// let sql = "CREATE DATABASE /*!32312 IF NOT EXISTS*/ `shop` /*!40100 DEFAULT CHARACTER SET utf8 */;";
/// assert_eq!(statement_name(sql).unwrap(), "shop");
/// assert_eq!(statement_name("INSERT INTO `orders` VALUES (1,'a');").unwrap(), "orders");
/// ```
pub fn statement_name(statement: &str) -> Result<String> {
    let uncommented = block_comment().replace_all(statement, "");
    let token = uncommented.split_whitespace().nth(2).with_context(|| {
        format!(
            "Cannot find object name in statement '{}'",
            preview(statement)
        )
    })?;

    let name = match backtick_quoted().captures(token).and_then(|c| c.get(1)) {
        Some(quoted) => quoted.as_str(),
        None => token.trim_end_matches(';'),
    };

    Ok(name.to_string())
}

/// Reduces `INSERT INTO ... VALUES (<row>),(<row>);` to its row payloads
///
/// The payload is everything between the first `VALUES (` and the final `);`.
/// It is cut into one entry per tuple at every `),(` boundary that lies
/// outside a string literal, with any whitespace (including `\r\n`) around
/// the comma. Single-line and multi-line extended INSERTs both come out one
/// row per entry.
pub fn insert_rows(statement: &str) -> Result<Vec<&str>> {
    let captures = insert_values().captures(statement).with_context(|| {
        format!(
            "INSERT statement has no 'VALUES (...);' payload: '{}'",
            preview(statement)
        )
    })?;

    match captures.get(1) {
        Some(payload) => Ok(split_tuples(payload.as_str())),
        None => bail!("INSERT statement has an empty payload"),
    }
}

/// Splits a VALUES payload at tuple boundaries outside quoted literals
fn split_tuples(payload: &str) -> Vec<&str> {
    let bytes = payload.as_bytes();
    let mut rows = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b')' => {
                    if let Some(next) = next_tuple_start(bytes, i + 1) {
                        rows.push(&payload[start..i]);
                        start = next;
                        i = next;
                        continue;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }

    rows.push(&payload[start..]);
    rows
}

/// Position just past the `(` of `\s*,\s*(` starting at `from`
fn next_tuple_start(bytes: &[u8], from: usize) -> Option<usize> {
    let skip_whitespace = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        i
    };

    let comma = skip_whitespace(from);
    if bytes.get(comma) != Some(&b',') {
        return None;
    }
    let open = skip_whitespace(comma + 1);
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    Some(open + 1)
}

/// Shortened single-line rendering of a statement for error messages
pub fn preview(statement: &str) -> String {
    crate::utils::sanitize_identifier(statement)
}
