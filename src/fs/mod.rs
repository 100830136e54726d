//! File system operations for snapshotting.

pub mod archive;
