//! # Persistence Format
//!
//! Binary encoding of a stored batch record.
//!
//! Format: Header (5 bytes) + postcard-serialized `Batch`.
//! - 4 bytes: Magic ("VAXB")
//! - 1 byte: Version
//!
//! Header and size are validated before the payload is decoded so that a
//! corrupted or oversized record never reaches the deserializer.

use crate::{Batch, VaxtraxError, primitives};

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed size of one stored batch record (16 MB).
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Minimum valid record size (header only).
const MIN_RECORD_SIZE: usize = 5;

// =============================================================================
// RECORD HEADER
// =============================================================================

/// The persistence header precedes every stored batch.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), VaxtraxError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(VaxtraxError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(VaxtraxError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaxtraxError> {
        let Some(head) = bytes.get(..MIN_RECORD_SIZE) else {
            return Err(VaxtraxError::SerializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[0..4]);
        Ok(Self {
            magic,
            version: head[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a batch to bytes (header + payload).
pub fn batch_to_bytes(batch: &Batch) -> Result<Vec<u8>, VaxtraxError> {
    let header = PersistenceHeader::new();
    let payload = postcard::to_allocvec(batch)
        .map_err(|e| VaxtraxError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_RECORD_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a batch from bytes.
///
/// Validates size bounds and the header before touching the payload.
pub fn batch_from_bytes(bytes: &[u8]) -> Result<Batch, VaxtraxError> {
    if bytes.len() < MIN_RECORD_SIZE {
        return Err(VaxtraxError::SerializationError(
            "Data too short: minimum 5 bytes required".to_string(),
        ));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(VaxtraxError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[MIN_RECORD_SIZE..]).map_err(|e| {
        VaxtraxError::SerializationError(format!("Failed to deserialize batch record: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
