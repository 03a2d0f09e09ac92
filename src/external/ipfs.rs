// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0

//! Content-addressed metadata store contract.
//!
//! The core only consumes the returned URI and stores it in the
//! attestation; it never fetches or interprets the content.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Metadata store errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The store rejected or failed the upload.
    #[error("upload")]
    Upload,
    /// The store returned a URI outside the `ipfs://<cid>` shape.
    #[error("invalid uri")]
    InvalidUri,
}

/// A content-addressed store for attestation proof metadata.
///
/// Implementations live outside the core; the pipeline only needs the
/// URI. Absence of a store yields the empty-string URI.
pub trait MetadataStore: Send + Sync {
    /// Persist a metadata blob and return its `ipfs://<cid>` URI.
    fn put_metadata(&self, blob: &[u8]) -> Result<String, MetadataError>;
}

/// Check the `ipfs://<cid>` URI shape. The empty string (absent) is NOT
/// accepted here; callers treat it separately.
pub fn is_valid_metadata_uri(uri: &str) -> bool {
    match uri.strip_prefix("ipfs://") {
        Some(cid) => !cid.is_empty() && cid.bytes().all(|b| b.is_ascii_alphanumeric()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_shape() {
        assert!(is_valid_metadata_uri("ipfs://QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"));
        assert!(is_valid_metadata_uri("ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi"));
        assert!(!is_valid_metadata_uri(""));
        assert!(!is_valid_metadata_uri("ipfs://"));
        assert!(!is_valid_metadata_uri("http://example.com"));
        assert!(!is_valid_metadata_uri("ipfs://has space"));
    }
}
