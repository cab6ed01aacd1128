//! Key derivation: Argon2id passphrase → master secret

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use cryptobox_core::{CbResult, CryptoBoxError};

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit master secret derived from a passphrase via Argon2id.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id cost parameters plus the per-container salt.
///
/// The salt is generated fresh for every container and stored in the header;
/// it never needs to be secret and is never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost_kib: u32,
    /// Time cost / iterations
    pub time_cost: u32,
    /// Parallelism (lanes)
    pub parallelism: u32,
    pub salt: [u8; SALT_SIZE],
}

impl KdfParams {
    /// Build params with a freshly generated random salt.
    pub fn generate(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            mem_cost_kib,
            time_cost,
            parallelism,
            salt,
        }
    }
}

/// Derive the 256-bit master secret from a passphrase using Argon2id.
///
/// Deterministic given identical inputs. `DerivationFailure` means the KDF
/// could not run with the configured cost parameters (e.g. the memory limit
/// is unsatisfiable on this host); it is never retried here.
pub fn derive_master_key(passphrase: &SecretString, params: &KdfParams) -> CbResult<MasterKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoBoxError::DerivationFailure(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(
            passphrase.expose_secret().as_bytes(),
            &params.salt,
            &mut key,
        )
        .map_err(|e| CryptoBoxError::DerivationFailure(format!("Argon2id KDF failed: {e}")))?;

    Ok(MasterKey::from_bytes(key))
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    // Fast params for testing
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
        salt: [7u8; SALT_SIZE],
    }
}
