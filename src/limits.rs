// ABOUTME: Include/exclude rules deciding which databases and tables take part in a pass
// ABOUTME: Parses `[-]database[/table]` tokens and answers inclusion queries

use anyhow::{bail, Result};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LimitKey {
    Database(String),
    Table(String, String),
}

/// Ordered database/table inclusion rules
///
/// Built from tokens of the form `name`, `-name`, `name/table` or `-name/table`.
/// A leading `-` negates the rule. Later tokens override earlier ones with the
/// same key. As soon as one positive rule is given, anything not matched by a
/// rule is excluded; with only negative rules (or none) everything not matched
/// is included.
#[derive(Debug, Clone)]
pub struct Limits {
    default: bool,
    rules: BTreeMap<LimitKey, bool>,
    databases: BTreeSet<String>,
}

impl Default for Limits {
    fn default() -> Self {
        Self::none()
    }
}

impl Limits {
    /// Builds limits from configuration tokens
    ///
    /// # Errors
    ///
    /// Returns an error if a token is empty, has more than one `/`, or has an
    /// empty database or table component.
    ///
    /// # Examples
    ///
    /// ```
    /// # use mysql_dumpfs::limits::Limits;
    /// let limits = Limits::new(&["db1", "-db1/secrets"]).unwrap();
    /// assert!(limits.includes_database("db1"));
    /// assert!(limits.includes_table("db1", "users"));
    /// assert!(!limits.includes_table("db1", "secrets"));
    /// assert!(!limits.includes_database("db2"));
    /// ```
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let mut limits = Self::none();

        for token in tokens {
            let token = token.as_ref().trim();
            let (sign, target) = match token.strip_prefix('-') {
                Some(rest) => (false, rest),
                None => (true, token),
            };

            if target.is_empty() {
                bail!("Limit '{}' must name a database", token);
            }

            let key = match target.split_once('/') {
                Some((database, table)) => {
                    if table.contains('/') {
                        bail!(
                            "Limit '{}' has more than one '/'. Expected 'database/table'",
                            token
                        );
                    }
                    if database.is_empty() || table.is_empty() {
                        bail!(
                            "Limit '{}' must be 'database/table' with both parts non-empty",
                            token
                        );
                    }
                    if sign {
                        limits.databases.insert(database.to_string());
                    }
                    LimitKey::Table(database.to_string(), table.to_string())
                }
                None => LimitKey::Database(target.to_string()),
            };

            if sign {
                limits.default = false;
            }
            limits.rules.insert(key, sign);
        }

        Ok(limits)
    }

    /// Limits with no rules: everything is included
    pub fn none() -> Self {
        Self {
            default: true,
            rules: BTreeMap::new(),
            databases: BTreeSet::new(),
        }
    }

    /// Checks if any rules were supplied
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decision for anything no rule matches
    pub fn default_inclusion(&self) -> bool {
        self.default
    }

    /// Determines if a database takes part in the pass
    pub fn includes_database(&self, database: &str) -> bool {
        if let Some(sign) = self.rules.get(&LimitKey::Database(database.to_string())) {
            return *sign;
        }

        if self.databases.contains(database) {
            return true;
        }

        self.default
    }

    /// Determines if a table's rows take part in the pass
    pub fn includes_table(&self, database: &str, table: &str) -> bool {
        let exact = LimitKey::Table(database.to_string(), table.to_string());
        if let Some(sign) = self.rules.get(&exact) {
            return *sign;
        }

        if let Some(sign) = self.rules.get(&LimitKey::Database(database.to_string())) {
            return *sign;
        }

        self.default
    }

    /// Evaluates a `database` or `database/table` query string
    pub fn includes(&self, entity: &str) -> bool {
        match entity.split_once('/') {
            Some((database, table)) => self.includes_table(database, table),
            None => self.includes_database(entity),
        }
    }
}
