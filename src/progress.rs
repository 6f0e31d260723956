// ABOUTME: Progress reporting for accepted databases and tables
// ABOUTME: Drives an indicatif spinner and prints one line per entity

use crate::tree::Entity;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Line printed for an entity, in the style of the dump client's verbose output
pub fn describe(entity: Entity<'_>) -> String {
    match entity {
        Entity::Database(database) => format!("database: {}", database.name),
        Entity::Table(table) => format!("table: {}", table.qualified_name()),
    }
}

/// Spinner on stderr that logs each entity as a transcoding pass accepts it
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(quiet: bool) -> Self {
        if quiet {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {elapsed} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn report(&self, entity: Entity<'_>) {
        let line = describe(entity);
        self.bar.println(&line);
        self.bar.set_message(line);
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
