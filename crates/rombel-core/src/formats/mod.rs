//! # Formats
//!
//! Byte-level encodings of the enrollment tables.
//! File I/O is left to the app layer.

mod persistence;

pub use persistence::{
    MAX_SNAPSHOT_SIZE, Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes,
};
