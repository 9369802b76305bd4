//! # Canonical Export Module
//!
//! redb files are not bit-identical across runs. The canonical export is:
//! a sorted, bit-exact `postcard` stream of the whole store, used for
//! verification, backups and the file backend.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalBom (postcard)]
//! ```

use crate::{BomError, BomRead, BomStore, Component, Link, MemoryStore, Mutation, Revision};
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"BOMX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum component count accepted on import.
pub const MAX_IMPORT_COMPONENTS: u64 = 1_000_000;

/// Maximum revision or link count accepted on import.
pub const MAX_IMPORT_RECORDS: u64 = 10_000_000;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub component_count: u64,
    pub revision_count: u64,
    pub link_count: u64,
    /// Checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    fn for_bom(bom: &CanonicalBom) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            component_count: bom.components.len() as u64,
            revision_count: bom.revisions.len() as u64,
            link_count: bom.links.len() as u64,
            checksum: bom.checksum(),
        }
    }

    /// Validate magic, version and size limits.
    ///
    /// Error messages stay generic so they do not describe the format.
    pub fn validate(&self) -> Result<(), BomError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(BomError::SerializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(BomError::SerializationError(
                "Unsupported file version".to_string(),
            ));
        }
        if self.component_count > MAX_IMPORT_COMPONENTS {
            return Err(BomError::SerializationError(format!(
                "Component count {} exceeds maximum allowed {}",
                self.component_count, MAX_IMPORT_COMPONENTS
            )));
        }
        if self.revision_count > MAX_IMPORT_RECORDS || self.link_count > MAX_IMPORT_RECORDS {
            return Err(BomError::SerializationError(format!(
                "Record count exceeds maximum allowed {MAX_IMPORT_RECORDS}"
            )));
        }
        Ok(())
    }
}

/// The whole store, every record list sorted by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalBom {
    pub components: Vec<Component>,
    pub revisions: Vec<Revision>,
    pub links: Vec<Link>,
    pub next_id: u64,
}

/// Order-sensitive 64-bit mix. Not cryptographic.
struct Checksum(u64);

impl Checksum {
    fn word(&mut self, value: u64) {
        self.0 = (self.0.rotate_left(7) ^ value).wrapping_mul(0x0000_0100_0000_01b3);
    }

    fn text(&mut self, value: &str) {
        self.word(value.len() as u64);
        for byte in value.as_bytes() {
            self.word(u64::from(*byte));
        }
    }

    fn float(&mut self, value: f64) {
        self.word(value.to_bits());
    }
}

impl CanonicalBom {
    /// Snapshot any store.
    pub fn from_store<S: BomRead + ?Sized>(store: &S) -> Result<Self, BomError> {
        let components = store.components()?;
        let mut revisions = Vec::new();
        for component in &components {
            revisions.extend(store.get_revisions(component.id)?);
        }
        let mut links = Vec::new();
        for revision in &revisions {
            links.extend(store.get_links(revision.id)?);
        }
        revisions.sort_by_key(|r| r.id);
        links.sort_by_key(|l| l.id);

        Ok(Self {
            components,
            revisions,
            links,
            next_id: store.next_id(),
        })
    }

    /// Deterministic checksum over every field.
    ///
    /// Detects accidental corruption only. For tamper evidence use the
    /// BLAKE3 hash (`crypto-hash` feature).
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut sum = Checksum(0xcbf2_9ce4_8422_2325);

        for c in &self.components {
            sum.word(c.id.0);
            sum.text(&c.name);
            sum.text(c.classification.as_str());
            sum.text(c.kind.as_str());
            sum.text(&c.unit);
            sum.text(c.description.as_deref().unwrap_or_default());
        }
        for r in &self.revisions {
            sum.word(r.id.0);
            sum.word(r.component.0);
            for value in r.attributes.to_array() {
                sum.float(value);
            }
            sum.word(r.issued_at.0 as u64);
            sum.word(r.locked_at.map_or(u64::MAX, |t| t.0 as u64));
        }
        for l in &self.links {
            sum.word(l.id.0);
            sum.word(l.source.0);
            sum.word(l.target.0);
            sum.float(l.quantity.value());
            sum.text(l.classification.as_str());
            sum.word(l.kind as u64);
            sum.text(l.description.as_deref().unwrap_or_default());
            sum.word(l.issued_at.0 as u64);
        }
        sum.word(self.next_id);

        sum.0
    }

    /// Write every record into `store` as one batch, preserving ids.
    pub fn load_into<S: BomStore + ?Sized>(&self, store: &mut S) -> Result<(), BomError> {
        let mut batch =
            Vec::with_capacity(self.components.len() + self.revisions.len() + self.links.len());
        batch.extend(self.components.iter().cloned().map(Mutation::PutComponent));
        batch.extend(self.revisions.iter().cloned().map(Mutation::PutRevision));
        batch.extend(self.links.iter().cloned().map(Mutation::PutLink));
        store.reserve_ids(self.next_id);
        store.apply(batch)
    }

    /// Rebuild an in-memory store.
    pub fn to_memory_store(&self) -> Result<MemoryStore, BomError> {
        let mut store = MemoryStore::new();
        self.load_into(&mut store)?;
        Ok(store)
    }
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export a store to canonical postcard format.
pub fn export_canonical<S: BomRead + ?Sized>(store: &S) -> Result<Vec<u8>, BomError> {
    let bom = CanonicalBom::from_store(store)?;
    let header = CanonicalHeader::for_bom(&bom);

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| BomError::SerializationError(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(&bom)
        .map_err(|e| BomError::SerializationError(format!("Data: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Decode and verify a canonical export.
///
/// The header (and its size limits) is checked before the data section is
/// deserialized.
pub fn import_canonical(data: &[u8]) -> Result<CanonicalBom, BomError> {
    let Some(len_bytes) = data.get(..4) else {
        return Err(BomError::SerializationError("Data too short".to_string()));
    };
    let mut len = [0u8; 4];
    len.copy_from_slice(len_bytes);
    let header_len = u32::from_le_bytes(len) as usize;

    let Some(header_bytes) = data.get(4..4 + header_len) else {
        return Err(BomError::SerializationError(
            "Data too short for header".to_string(),
        ));
    };
    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| BomError::SerializationError(format!("Header: {}", e)))?;
    header.validate()?;

    let bom: CanonicalBom = postcard::from_bytes(&data[4 + header_len..])
        .map_err(|e| BomError::SerializationError(format!("Data: {}", e)))?;

    let computed = bom.checksum();
    if computed != header.checksum {
        return Err(BomError::SerializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    if bom.components.len() as u64 != header.component_count
        || bom.revisions.len() as u64 != header.revision_count
        || bom.links.len() as u64 != header.link_count
    {
        return Err(BomError::SerializationError(
            "Record count mismatch".to_string(),
        ));
    }

    Ok(bom)
}

/// Whether `store` holds exactly what `canonical_data` describes.
pub fn verify_canonical<S: BomRead + ?Sized>(
    store: &S,
    canonical_data: &[u8],
) -> Result<bool, BomError> {
    let imported = import_canonical(canonical_data)?;
    Ok(CanonicalBom::from_store(store)? == imported)
}

/// Canonical checksum of a store.
pub fn canonical_checksum<S: BomRead + ?Sized>(store: &S) -> Result<u64, BomError> {
    Ok(CanonicalBom::from_store(store)?.checksum())
}

// =============================================================================
// CRYPTOGRAPHIC HASH
// =============================================================================

/// BLAKE3 hash (hex) of a store's canonical export.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash<S: BomRead + ?Sized>(store: &S) -> Result<String, BomError> {
    let data = export_canonical(store)?;
    Ok(compute_blake3_hash(&data))
}

/// BLAKE3 hash (hex) of raw bytes.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;

    fn sample() -> Fixture {
        let mut fx = Fixture::new();
        let (_, root) = fx.component("Frame", 3.5);
        let (bolt, _) = fx.component("Bolt", 0.02);
        fx.link(root, bolt, 8.0);
        fx.lock(root);
        fx
    }

    #[test]
    fn export_import_preserves_everything() {
        let fx = sample();
        let data = export_canonical(&fx.store).unwrap();

        let bom = import_canonical(&data).unwrap();
        let restored = bom.to_memory_store().unwrap();

        assert!(verify_canonical(&restored, &data).unwrap());
        assert_eq!(restored.next_id(), fx.store.next_id());
        assert_eq!(
            canonical_checksum(&restored).unwrap(),
            canonical_checksum(&fx.store).unwrap()
        );
    }

    #[test]
    fn export_is_deterministic() {
        let fx = sample();
        assert_eq!(
            export_canonical(&fx.store).unwrap(),
            export_canonical(&fx.store).unwrap()
        );
    }

    #[test]
    fn checksum_is_order_sensitive() {
        let fx = sample();
        let mut bom = CanonicalBom::from_store(&fx.store).unwrap();
        let before = bom.checksum();
        bom.revisions.reverse();
        assert_ne!(bom.checksum(), before);
    }

    #[test]
    fn corrupted_data_is_rejected() {
        let fx = sample();
        let mut data = export_canonical(&fx.store).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        assert!(import_canonical(&data).is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let header = CanonicalHeader {
            magic: *b"NOPE",
            version: CANONICAL_VERSION,
            component_count: 0,
            revision_count: 0,
            link_count: 0,
            checksum: 0,
        };
        assert!(matches!(
            header.validate(),
            Err(BomError::SerializationError(_))
        ));
    }

    #[test]
    fn oversized_header_is_rejected_before_data() {
        let header = CanonicalHeader {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            component_count: MAX_IMPORT_COMPONENTS + 1,
            revision_count: 0,
            link_count: 0,
            checksum: 0,
        };
        let header_bytes = postcard::to_allocvec(&header).unwrap();
        let mut data = (header_bytes.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&header_bytes);

        match import_canonical(&data) {
            Err(BomError::SerializationError(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("expected size error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(import_canonical(&[1, 0]).is_err());
        assert!(import_canonical(&[200, 0, 0, 0, 1]).is_err());
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_stable() {
        let fx = sample();
        let a = canonical_crypto_hash(&fx.store).unwrap();
        let b = canonical_crypto_hash(&fx.store).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
