//! Revocation status lists.
//!
//! One bitmap per `(issuer, epoch)`: bit `i` set means the credential at
//! index `i` is revoked. Bitmaps are ordinary content-addressed blobs; the
//! store keeps a `status/<issuer>/<epoch>` pointer at the latest one.

use std::sync::Arc;

use credence_core::canonical;
use credence_core::error::CredenceError;
use credence_core::types::{ContentAddress, Epoch, Id};
use credence_store::EventStore;

/// A little-endian bit vector over credential indexes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusBitmap {
    bits: Vec<u8>,
}

impl StatusBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bits: bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn set(&mut self, index: u32) {
        let byte = (index / 8) as usize;
        if byte >= self.bits.len() {
            self.bits.resize(byte + 1, 0);
        }
        self.bits[byte] |= 1 << (index % 8);
    }

    pub fn get(&self, index: u32) -> bool {
        self.bits
            .get((index / 8) as usize)
            .map(|b| b & (1 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    pub fn content_address(&self) -> ContentAddress {
        canonical::content_address_of_bytes(&self.bits)
    }
}

/// Publish a bitmap and point `status/<issuer>/<epoch>` at it.
pub fn publish_status_list(
    store: &Arc<dyn EventStore>,
    issuer: &Id,
    epoch: Epoch,
    bitmap: &StatusBitmap,
) -> Result<ContentAddress, CredenceError> {
    let addr = store.put_blob(bitmap.as_bytes())?;
    store.put_status_list(issuer, epoch, &addr)?;
    Ok(addr)
}

/// Whether `index` is revoked per the issuer's list for `epoch`. A missing
/// list means nothing has been revoked.
pub fn is_revoked(
    store: &Arc<dyn EventStore>,
    issuer: &Id,
    epoch: Epoch,
    index: u32,
) -> Result<bool, CredenceError> {
    let Some(addr) = store.status_list(issuer, epoch)? else {
        return Ok(false);
    };
    let bytes = store
        .get_blob(&addr)?
        .ok_or_else(|| CredenceError::NotFound(format!("status bitmap {addr}")))?;
    Ok(StatusBitmap::from_bytes(bytes).get(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_store::SledStore;

    #[test]
    fn bitmap_sets_and_reads_bits() {
        let mut bitmap = StatusBitmap::new();
        assert!(!bitmap.get(13));
        bitmap.set(13);
        assert!(bitmap.get(13));
        assert!(!bitmap.get(12));
        bitmap.set(0);
        assert!(bitmap.get(0));
    }

    #[test]
    fn published_list_resolves_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn EventStore> = Arc::new(SledStore::open(dir.path()).unwrap());
        let issuer = Id::new("key:zissuer").unwrap();
        let epoch = Epoch::new(2025, 9).unwrap();

        let mut bitmap = StatusBitmap::new();
        bitmap.set(42);
        publish_status_list(&store, &issuer, epoch, &bitmap).unwrap();

        assert!(is_revoked(&store, &issuer, epoch, 42).unwrap());
        assert!(!is_revoked(&store, &issuer, epoch, 41).unwrap());
        // No list for another issuer: nothing revoked.
        let other = Id::new("key:zother").unwrap();
        assert!(!is_revoked(&store, &other, epoch, 42).unwrap());
    }
}
