//! # Snapshot Format
//!
//! Binary snapshots of the whole enrollment state, used by the file backend
//! and by export/import.
//!
//! Format: Header (5 bytes) + postcard-serialized tables.
//! - 4 bytes: Magic ("RMBL")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded.

use crate::history::IntegrityReport;
use crate::store::{Changeset, EnrollmentStore};
use crate::{ClassRecord, EnrollmentRecord, ExitRecord, RombelError, TransferRecord, primitives};
use serde::{Deserialize, Serialize};

/// Maximum accepted snapshot size.
///
/// Checked before deserialization so a corrupted or hostile file cannot
/// force a large allocation.
pub const MAX_SNAPSHOT_SIZE: usize = 64 * 1024 * 1024; // 64 MB

const HEADER_LEN: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header that precedes every snapshot payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), RombelError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(RombelError::Serialization(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(RombelError::Serialization(format!(
                "Unsupported snapshot version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RombelError> {
        let Some(header) = bytes.get(..HEADER_LEN) else {
            return Err(RombelError::Serialization("Header too short".to_string()));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Every table of an enrollment store, in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub classes: Vec<ClassRecord>,
    pub enrollments: Vec<EnrollmentRecord>,
    pub transfers: Vec<TransferRecord>,
    pub exits: Vec<ExitRecord>,
}

impl Snapshot {
    /// Copy every table out of `store`.
    pub fn capture(store: &impl EnrollmentStore) -> Result<Self, RombelError> {
        Ok(Self {
            classes: store.classes()?,
            enrollments: store.enrollments()?,
            transfers: store.transfers()?,
            exits: store.exits()?,
        })
    }

    /// Audit the snapshot's occupancy counters against its active records.
    ///
    /// A snapshot that passes loads into a store where every class's
    /// occupancy equals its active enrollments and stays within capacity.
    pub fn validate(&self) -> Result<(), RombelError> {
        let report = IntegrityReport::audit(&self.classes, &self.enrollments);
        if report.is_clean() {
            return Ok(());
        }
        Err(RombelError::Serialization(format!(
            "Snapshot is inconsistent: {}",
            report.describe()
        )))
    }

    /// A changeset that recreates this snapshot in an empty store.
    ///
    /// Committing it only checks record versions and single-active
    /// enrollment; call [`Snapshot::validate`] first to audit occupancy.
    #[must_use]
    pub fn to_changeset(&self) -> Changeset {
        let mut changeset = Changeset::new();
        for class in &self.classes {
            changeset.create_class(class.clone());
        }
        for enrollment in &self.enrollments {
            changeset.put_enrollment(enrollment.clone());
        }
        for transfer in &self.transfers {
            changeset.append_transfer(transfer.clone());
        }
        for exit in &self.exits {
            changeset.append_exit(exit.clone());
        }
        changeset
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a snapshot to bytes (header + payload).
pub fn snapshot_to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, RombelError> {
    let payload =
        postcard::to_stdvec(snapshot).map_err(|e| RombelError::Serialization(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(&SnapshotHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a snapshot, validating size and header first.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<Snapshot, RombelError> {
    if bytes.len() > MAX_SNAPSHOT_SIZE {
        return Err(RombelError::Serialization(format!(
            "Snapshot size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_LEN..).unwrap_or_default();
    postcard::from_bytes(payload).map_err(|e| {
        RombelError::Serialization(format!("Failed to deserialize snapshot: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
