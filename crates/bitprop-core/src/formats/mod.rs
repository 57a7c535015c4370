//! # Formats
//!
//! Byte-level encodings of a propagation graph. File I/O lives in the app.

pub mod snapshot;

pub use snapshot::{
    MAX_SNAPSHOT_PAYLOAD_SIZE, SnapshotHeader, graph_from_bytes, graph_to_bytes, read_header,
};
