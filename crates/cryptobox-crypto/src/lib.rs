//! cryptobox-crypto: container cryptography for CryptoBox
//!
//! Container layout:
//! ```text
//! [magic "CRYPTBOX"][version u16][body_len u32][header body JSON][header tag 32B]
//!   || frame0 [len u32 | ciphertext‖tags] || frame1 ... || final frame (bit 31 set)
//! ```
//!
//! Key hierarchy:
//! ```text
//! Master secret (256-bit, Argon2id from passphrase + per-container salt)
//!   ├── Header MAC key   (HKDF-SHA256, domain "cryptobox/v1/header", keyed BLAKE3 tag)
//!   └── Body stage keys  (HKDF-SHA256, domain "cryptobox/v1/body/{stage}/{cipher}",
//!                         one per cascade stage, sized to the AEAD's key length)
//! ```
//!
//! Chunk AEAD: per-suite primitive (ChaCha20-Poly1305, AES-256-GCM/SIV/EAX,
//! Serpent-GCM/SIV/EAX) with AAD = chunk_index || final_flag, nonce derived
//! deterministically from the header's base nonce, the stage index and the
//! chunk counter.

pub mod header;
pub mod kdf;
pub mod keys;
pub mod suite;

pub use header::{parse_prefix, Header, PendingHeader};
pub use kdf::{derive_master_key, KdfParams, MasterKey};
pub use suite::{CipherId, CipherSuiteId, SuiteCipher};

/// Size of the master key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-container KDF salt
pub const SALT_SIZE: usize = 16;

/// Size of the base nonce stored in the header. Per-chunk nonces are derived
/// from it and truncated to each AEAD's native nonce length.
pub const BASE_NONCE_SIZE: usize = 16;

/// Size of a single AEAD authentication tag (all suite members use 128-bit tags)
pub const TAG_SIZE: usize = 16;

/// Size of the keyed-BLAKE3 header authentication tag
pub const HEADER_TAG_SIZE: usize = 32;
