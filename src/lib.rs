// ABOUTME: Library module for mysql-dumpfs
// ABOUTME: Exports the dump/tree transcoder for use in the binary and tests

pub mod commands;
pub mod config;
pub mod limits;
pub mod progress;
pub mod sql;
pub mod tree;
pub mod utils;
