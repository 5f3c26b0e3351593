//! Content fingerprint used for duplicate detection.
//!
//! The fingerprint is the SHA-256 of the raw uploaded bytes, hex-encoded.
//! Two uploads are duplicates exactly when their bytes are identical; a
//! re-saved copy of the same document with different bytes is a new upload.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `bytes` (64 characters).
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
