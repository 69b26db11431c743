//! Length-prefixed binary envelope shared by the cache transports
//!
//! Every stored artifact travels with a metadata block describing the rule
//! keys it claims, a free-form string map, and the declared payload length
//! and SHA-256 digest. The block has a stable hand-written layout (all
//! integers big-endian) so both sides of the wire and the on-disk sidecars
//! agree byte for byte:
//!
//! ```text
//! u32 rule key count
//!   per key:   u32 length, lowercase hex bytes
//! u32 metadata entry count
//!   per entry: u32 key length, key bytes, u32 value length, value bytes
//! u64 payload length
//! 32-byte SHA-256 payload digest
//! ```
//!
//! A fetch response body is `[u32 block length][block][payload]` with no
//! terminator; a store request body prefixes that with its own rule-key
//! header: `[u32 key count][per key: u32 length + hex bytes]`.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::artifact::ArtifactInfo;
use crate::errors::{CacheError, Result};
use crate::keys::RuleKey;

/// Upper bound on a metadata block, guarding against hostile length prefixes
pub const MAX_METADATA_BLOCK_LEN: u32 = 16 * 1024 * 1024;

/// Size of the payload digest in bytes
pub const PAYLOAD_DIGEST_LEN: usize = 32;

/// SHA-256 digest of a payload held fully in memory
#[must_use]
pub fn payload_digest(payload: &[u8]) -> [u8; PAYLOAD_DIGEST_LEN] {
    Sha256::digest(payload).into()
}

/// Metadata block accompanying every artifact on the wire and on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactMetadata {
    rule_keys: Vec<RuleKey>,
    metadata: BTreeMap<String, String>,
    payload_len: u64,
    payload_digest: [u8; PAYLOAD_DIGEST_LEN],
}

impl ArtifactMetadata {
    /// Build the block for an artifact about to be stored
    #[must_use]
    pub fn for_artifact(
        info: &ArtifactInfo,
        payload_len: u64,
        payload_digest: [u8; PAYLOAD_DIGEST_LEN],
    ) -> Self {
        Self {
            rule_keys: info.rule_keys().to_vec(),
            metadata: info.metadata().clone(),
            payload_len,
            payload_digest,
        }
    }

    /// Rule keys the artifact claims to satisfy, in wire order
    #[must_use]
    pub fn rule_keys(&self) -> &[RuleKey] {
        &self.rule_keys
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Declared payload length in bytes
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// Declared SHA-256 digest of the payload
    #[must_use]
    pub fn payload_digest(&self) -> &[u8; PAYLOAD_DIGEST_LEN] {
        &self.payload_digest
    }

    /// Whether the artifact claims the given rule key
    #[must_use]
    pub fn contains(&self, rule_key: &RuleKey) -> bool {
        self.rule_keys.contains(rule_key)
    }

    /// Serialize the block to its stable wire layout
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_u32(&mut out, self.rule_keys.len() as u32);
        for key in &self.rule_keys {
            write_str(&mut out, &key.to_hex());
        }
        write_u32(&mut out, self.metadata.len() as u32);
        for (key, value) in &self.metadata {
            write_str(&mut out, key);
            write_str(&mut out, value);
        }
        out.extend_from_slice(&self.payload_len.to_be_bytes());
        out.extend_from_slice(&self.payload_digest);
        out
    }

    /// Decode a block, requiring every byte to be consumed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let key_count = cursor.read_u32()?;
        let mut rule_keys = Vec::new();
        for _ in 0..key_count {
            let hex = cursor.read_str()?;
            rule_keys.push(hex.parse::<RuleKey>().map_err(|e| {
                CacheError::envelope(format!("bad rule key in metadata block: {e}"))
            })?);
        }

        let entry_count = cursor.read_u32()?;
        let mut metadata = BTreeMap::new();
        for _ in 0..entry_count {
            let key = cursor.read_str()?;
            let value = cursor.read_str()?;
            metadata.insert(key, value);
        }

        let payload_len = cursor.read_u64()?;
        let payload_digest = cursor.read_array::<PAYLOAD_DIGEST_LEN>()?;

        if !cursor.is_empty() {
            return Err(CacheError::envelope(format!(
                "{} trailing bytes after metadata block",
                cursor.remaining()
            )));
        }

        Ok(Self {
            rule_keys,
            metadata,
            payload_len,
            payload_digest,
        })
    }

    /// Fetch-response prefix: `[u32 block length][block]`
    ///
    /// The caller appends the raw payload to complete the body.
    #[must_use]
    pub fn encode_fetch_envelope(&self) -> Vec<u8> {
        let block = self.to_bytes();
        let mut out = Vec::with_capacity(4 + block.len());
        write_u32(&mut out, block.len() as u32);
        out.extend_from_slice(&block);
        out
    }

    /// Store-request prefix: rule-key header followed by the fetch envelope
    #[must_use]
    pub fn encode_store_header(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_u32(&mut out, self.rule_keys.len() as u32);
        for key in &self.rule_keys {
            write_str(&mut out, &key.to_hex());
        }
        out.extend_from_slice(&self.encode_fetch_envelope());
        out
    }
}

/// A decoded store request, as seen by a cache server
#[derive(Clone, Debug)]
pub struct StoreRequest {
    /// Keys from the request's own header, used for indexing
    pub rule_keys: Vec<RuleKey>,
    /// The embedded metadata block
    pub metadata: ArtifactMetadata,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// Decode a full store-request body
///
/// Validates the declared payload length and digest against the bytes that
/// actually arrived, mirroring what a fetch-side client enforces.
pub fn decode_store_request(bytes: &[u8]) -> Result<StoreRequest> {
    let mut cursor = Cursor::new(bytes);

    let key_count = cursor.read_u32()?;
    let mut rule_keys = Vec::new();
    for _ in 0..key_count {
        let hex = cursor.read_str()?;
        rule_keys.push(
            hex.parse::<RuleKey>()
                .map_err(|e| CacheError::envelope(format!("bad rule key in store header: {e}")))?,
        );
    }

    let block_len = cursor.read_u32()?;
    if block_len > MAX_METADATA_BLOCK_LEN {
        return Err(CacheError::envelope(format!(
            "metadata block of {block_len} bytes exceeds limit"
        )));
    }
    let block = cursor.read_exact(block_len as usize)?;
    let metadata = ArtifactMetadata::from_bytes(&block)?;

    let payload = cursor.rest();
    if (payload.len() as u64) < metadata.payload_len() {
        return Err(CacheError::Truncated {
            declared: metadata.payload_len(),
            received: payload.len() as u64,
        });
    }
    if (payload.len() as u64) > metadata.payload_len() {
        return Err(CacheError::Overrun {
            declared: metadata.payload_len(),
            received: payload.len() as u64,
        });
    }
    let actual = payload_digest(&payload);
    if &actual != metadata.payload_digest() {
        return Err(CacheError::DigestMismatch {
            expected: hex::encode(metadata.payload_digest()),
            actual: hex::encode(actual),
        });
    }

    Ok(StoreRequest {
        rule_keys,
        metadata,
        payload,
    })
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

/// Bounds-checked reader over a byte slice
struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(CacheError::envelope(format!(
                "expected {len} more bytes, found {}",
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice.to_vec())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.remaining() < N {
            return Err(CacheError::envelope(format!(
                "expected {N} more bytes, found {}",
                self.remaining()
            )));
        }
        let mut array = [0u8; N];
        array.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        Ok(array)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array::<8>()?))
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        if len > MAX_METADATA_BLOCK_LEN {
            return Err(CacheError::envelope(format!(
                "string of {len} bytes exceeds limit"
            )));
        }
        let bytes = self.read_exact(len as usize)?;
        String::from_utf8(bytes).map_err(|e| CacheError::envelope(format!("invalid UTF-8: {e}")))
    }

    /// Consume and return all remaining bytes
    fn rest(&mut self) -> Vec<u8> {
        let slice = &self.bytes[self.offset..];
        self.offset = self.bytes.len();
        slice.to_vec()
    }
}
