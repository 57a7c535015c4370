//! # Snapshot Format
//!
//! Binary serialization of a whole graph, messages and beliefs included, so
//! a run can be resumed or inspected later.
//!
//! Format: Header (7 bytes) + postcard-serialized graph data.
//! - 4 bytes: Magic ("BPRP")
//! - 1 byte: Version
//! - 1 byte: Domain width in bits
//! - 1 byte: Belief state (0 = distribution, 1 = information)
//!
//! Size and header are checked before the payload is parsed, so a reader
//! can tell the domain and how beliefs must be read without decoding the
//! graph. A decoded graph must agree with its header and pass
//! [`GraphStore::validate`] before it is returned.

use crate::{BeliefState, Domain, GraphStore, PropagationError, primitives};

/// Maximum accepted snapshot size, header included.
///
/// A 16-bit domain row is 512 KiB, so this leaves room for a few hundred
/// nodes at full width.
pub const MAX_SNAPSHOT_PAYLOAD_SIZE: usize = 256 * 1024 * 1024; // 256 MB

const HEADER_SIZE: usize = 7;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The snapshot header precedes all graph data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub domain: Domain,
    pub state: BeliefState,
}

impl SnapshotHeader {
    /// Header describing `graph` under the current format version.
    #[must_use]
    pub fn for_graph(graph: &GraphStore) -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
            domain: graph.domain(),
            state: graph.belief_state(),
        }
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(PropagationError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(PropagationError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Check that a decoded graph is the one this header announced.
    pub fn check_matches(&self, graph: &GraphStore) -> Result<(), PropagationError> {
        if graph.domain() != self.domain {
            return Err(PropagationError::DeserializationError(format!(
                "Header announces a {}-bit domain, payload holds {} bits",
                self.domain.bits(),
                graph.domain().bits()
            )));
        }
        if graph.belief_state() != self.state {
            return Err(PropagationError::DeserializationError(format!(
                "Header announces {:?} beliefs, payload holds {:?}",
                self.state,
                graph.belief_state()
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[5] = self.domain.bits() as u8;
        bytes[6] = self.state.tag();
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PropagationError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PropagationError::DeserializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let domain = Domain::new(u32::from(bytes[5])).map_err(|e| {
            PropagationError::DeserializationError(format!("Invalid header domain: {}", e))
        })?;
        let state = BeliefState::from_tag(bytes[6]).ok_or_else(|| {
            PropagationError::DeserializationError(format!(
                "Unknown belief state tag {}",
                bytes[6]
            ))
        })?;
        Ok(Self {
            magic,
            version: bytes[4],
            domain,
            state,
        })
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a graph to bytes (header + payload).
pub fn graph_to_bytes(graph: &GraphStore) -> Result<Vec<u8>, PropagationError> {
    let payload = postcard::to_stdvec(graph)
        .map_err(|e| PropagationError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&SnapshotHeader::for_graph(graph).to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Read and check only the header of a snapshot.
pub fn read_header(bytes: &[u8]) -> Result<SnapshotHeader, PropagationError> {
    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;
    Ok(header)
}

/// Deserialize and validate a graph.
pub fn graph_from_bytes(bytes: &[u8]) -> Result<GraphStore, PropagationError> {
    if bytes.len() < HEADER_SIZE {
        return Err(PropagationError::DeserializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(PropagationError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }

    let header = read_header(bytes)?;

    let graph: GraphStore = postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        PropagationError::DeserializationError(format!("Failed to decode graph data: {}", e))
    })?;
    header.check_matches(&graph)?;
    graph.validate()?;
    Ok(graph)
}

// =============================================================================
// TESTS
// =============================================================================
