//! Container header: encode, parse, and keyed-MAC verification
//!
//! Layout:
//!
//! ```text
//! magic "CRYPTBOX" (8) | version u16 BE | body_len u32 BE | body (JSON) | tag (32)
//! ```
//!
//! The body carries the suite, the KDF parameters, and the base nonce.
//! Nothing in it is secret, but all of it is authenticated: the tag is a
//! keyed BLAKE3 hash over prefix and body under a key derived from the
//! master key, so tampering with any field (including a downgrade of the
//! KDF cost parameters) is caught before a single chunk is touched.
//!
//! Parsing is two-phase. [`parse_prefix`] and [`PendingHeader::parse`] run
//! before any key derivation and classify structural problems as
//! `MalformedInput` and unknown versions as `BadVersion`. Only
//! [`PendingHeader::verify`] needs the master key; a bad tag is
//! `HeaderIntegrity`, which with a passphrase-derived key usually just means
//! the passphrase is wrong.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use cryptobox_core::{CbResult, CryptoBoxError};

use crate::kdf::{KdfParams, MasterKey};
use crate::keys::derive_header_key;
use crate::suite::CipherSuiteId;
use crate::{BASE_NONCE_SIZE, HEADER_TAG_SIZE, SALT_SIZE};

pub const MAGIC: [u8; 8] = *b"CRYPTBOX";
pub const CURRENT_VERSION: u16 = 1;
/// Bytes before the body: magic (8) + version (2) + body length (4).
pub const PREFIX_SIZE: usize = 14;
/// Upper bound on the JSON body, to reject garbage lengths before allocating.
pub const MAX_BODY_SIZE: u32 = 4096;

/// Fully parsed and authenticated header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub suite: CipherSuiteId,
    pub kdf: KdfParams,
    pub base_nonce: [u8; BASE_NONCE_SIZE],
}

/// Wire form of the body. Byte fields travel as base64 strings.
#[derive(Serialize, Deserialize)]
struct HeaderBody {
    suite: CipherSuiteId,
    kdf: KdfBody,
    base_nonce: String,
}

#[derive(Serialize, Deserialize)]
struct KdfBody {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
    salt: String,
}

impl Header {
    /// New header for an encryption job, with a fresh random base nonce.
    pub fn new(suite: CipherSuiteId, kdf: KdfParams) -> Self {
        let mut base_nonce = [0u8; BASE_NONCE_SIZE];
        OsRng.fill_bytes(&mut base_nonce);
        Self {
            suite,
            kdf,
            base_nonce,
        }
    }

    /// Serialize prefix, body, and tag into one buffer ready to write out.
    pub fn encode(&self, master: &MasterKey) -> CbResult<Vec<u8>> {
        let body = HeaderBody {
            suite: self.suite.clone(),
            kdf: KdfBody {
                mem_cost_kib: self.kdf.mem_cost_kib,
                time_cost: self.kdf.time_cost,
                parallelism: self.kdf.parallelism,
                salt: BASE64.encode(self.kdf.salt),
            },
            base_nonce: BASE64.encode(self.base_nonce),
        };
        let body = serde_json::to_vec(&body)
            .map_err(|e| CryptoBoxError::MalformedInput(format!("header encoding: {e}")))?;
        debug_assert!(body.len() <= MAX_BODY_SIZE as usize);

        let mut out = Vec::with_capacity(PREFIX_SIZE + body.len() + HEADER_TAG_SIZE);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&CURRENT_VERSION.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);

        let tag = header_tag(master, &out)?;
        out.extend_from_slice(tag.as_bytes());
        Ok(out)
    }
}

/// Check magic and version, return the body length still to be read.
///
/// Runs on the first [`PREFIX_SIZE`] bytes of a container, before anything
/// else. A bad magic is `MalformedInput`; a good magic with an unknown
/// version is `BadVersion`, reported without touching the passphrase.
pub fn parse_prefix(prefix: &[u8; PREFIX_SIZE]) -> CbResult<u32> {
    if prefix[..8] != MAGIC {
        return Err(CryptoBoxError::MalformedInput(
            "not a CryptoBox container (bad magic)".into(),
        ));
    }
    let version = u16::from_be_bytes([prefix[8], prefix[9]]);
    if version != CURRENT_VERSION {
        return Err(CryptoBoxError::BadVersion(version));
    }
    let body_len = u32::from_be_bytes([prefix[10], prefix[11], prefix[12], prefix[13]]);
    if body_len == 0 || body_len > MAX_BODY_SIZE {
        return Err(CryptoBoxError::MalformedInput(format!(
            "implausible header body length: {body_len}"
        )));
    }
    Ok(body_len)
}

/// Parsed but not yet authenticated header.
///
/// Exposes only the KDF parameters (needed to derive the master key);
/// everything else stays sealed until [`PendingHeader::verify`] passes.
pub struct PendingHeader {
    header: Header,
    authed: Vec<u8>,
    tag: [u8; HEADER_TAG_SIZE],
}

impl PendingHeader {
    /// Decode body and tag. `prefix` must already have passed [`parse_prefix`].
    pub fn parse(
        prefix: &[u8; PREFIX_SIZE],
        body: &[u8],
        tag: &[u8; HEADER_TAG_SIZE],
    ) -> CbResult<Self> {
        let wire: HeaderBody = serde_json::from_slice(body)
            .map_err(|e| CryptoBoxError::MalformedInput(format!("header body: {e}")))?;
        wire.suite.validate()?;

        let salt = decode_array::<SALT_SIZE>(&wire.kdf.salt, "salt")?;
        let base_nonce = decode_array::<BASE_NONCE_SIZE>(&wire.base_nonce, "base nonce")?;

        let header = Header {
            suite: wire.suite,
            kdf: KdfParams {
                mem_cost_kib: wire.kdf.mem_cost_kib,
                time_cost: wire.kdf.time_cost,
                parallelism: wire.kdf.parallelism,
                salt,
            },
            base_nonce,
        };

        let mut authed = Vec::with_capacity(PREFIX_SIZE + body.len());
        authed.extend_from_slice(prefix);
        authed.extend_from_slice(body);

        Ok(Self {
            header,
            authed,
            tag: *tag,
        })
    }

    /// KDF parameters for master-key derivation. Unauthenticated at this
    /// point; a substituted salt or cost is caught by [`PendingHeader::verify`].
    pub fn kdf(&self) -> &KdfParams {
        &self.header.kdf
    }

    /// Constant-time tag check. Consumes self so an unverified header can
    /// never leak back out.
    pub fn verify(self, master: &MasterKey) -> CbResult<Header> {
        let expected = header_tag(master, &self.authed)?;
        if expected != blake3::Hash::from_bytes(self.tag) {
            return Err(CryptoBoxError::HeaderIntegrity);
        }
        Ok(self.header)
    }
}

fn header_tag(master: &MasterKey, authed: &[u8]) -> CbResult<blake3::Hash> {
    let key = derive_header_key(master)?;
    Ok(blake3::keyed_hash(&key, authed))
}

fn decode_array<const N: usize>(s: &str, what: &str) -> CbResult<[u8; N]> {
    let bytes = BASE64
        .decode(s)
        .map_err(|_| CryptoBoxError::MalformedInput(format!("header {what}: invalid base64")))?;
    bytes
        .try_into()
        .map_err(|_| CryptoBoxError::MalformedInput(format!("header {what}: wrong length")))
}
