// ABOUTME: Command implementations for each transcoding direction
// ABOUTME: Exports write (dump to tree) and read (tree to dump) commands

pub mod read;
pub mod write;

pub use read::read;
pub use write::write;
