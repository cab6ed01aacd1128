//! Key hierarchy: master secret → domain-separated subkeys via HKDF-SHA256
//!
//! The header MAC key and every cascade stage key are derived from the single
//! master secret with distinct context strings, so compromising one context
//! never reveals another.

use hkdf::Hkdf;
use sha2::Sha256;

use cryptobox_core::{CbResult, CryptoBoxError};

use crate::suite::CipherId;
use crate::{MasterKey, HEADER_TAG_SIZE};

const HEADER_DOMAIN: &[u8] = b"cryptobox/v1/header";

/// Derive the keyed-BLAKE3 MAC key for the header context.
pub fn derive_header_key(master: &MasterKey) -> CbResult<[u8; HEADER_TAG_SIZE]> {
    let mut okm = [0u8; HEADER_TAG_SIZE];
    hkdf_expand(master, HEADER_DOMAIN, &mut okm)?;
    Ok(okm)
}

/// Context string for cascade stage `stage` running cipher `id`.
///
/// Both the position and the cipher name participate, so reordering a cascade
/// changes every stage key.
pub(crate) fn stage_info(stage: usize, id: CipherId) -> Vec<u8> {
    format!("cryptobox/v1/body/{stage}/{}", id.as_str()).into_bytes()
}

/// HKDF-SHA256 expand from the master secret into `okm`.
///
/// Output length varies: AEAD key sizes differ per suite member.
pub(crate) fn hkdf_expand(master: &MasterKey, info: &[u8], okm: &mut [u8]) -> CbResult<()> {
    let hkdf = Hkdf::<Sha256>::new(None, master.as_bytes());
    hkdf.expand(info, okm)
        .map_err(|e| CryptoBoxError::DerivationFailure(format!("HKDF expand failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn test_master_key() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_header_key_differs_from_stage_keys() {
        let master = test_master_key();
        let header_key = derive_header_key(&master).unwrap();

        let mut stage_key = [0u8; HEADER_TAG_SIZE];
        hkdf_expand(
            &master,
            &stage_info(0, CipherId::Chacha20Poly1305),
            &mut stage_key,
        )
        .unwrap();

        assert_ne!(
            header_key, stage_key,
            "header context must never equal a body context"
        );
    }

    #[test]
    fn test_stage_keys_domain_separated() {
        let master = test_master_key();

        let mut k0 = [0u8; KEY_SIZE];
        let mut k1 = [0u8; KEY_SIZE];
        hkdf_expand(&master, &stage_info(0, CipherId::Aes256Gcm), &mut k0).unwrap();
        hkdf_expand(&master, &stage_info(1, CipherId::Aes256Gcm), &mut k1).unwrap();
        assert_ne!(k0, k1, "same cipher at different stages must get distinct keys");

        let mut other = [0u8; KEY_SIZE];
        hkdf_expand(&master, &stage_info(0, CipherId::SerpentGcm), &mut other).unwrap();
        assert_ne!(k0, other, "different ciphers at the same stage must get distinct keys");
    }

    #[test]
    fn test_expand_deterministic() {
        let master = test_master_key();
        let mut a = [0u8; KEY_SIZE];
        let mut b = [0u8; KEY_SIZE];
        hkdf_expand(&master, b"cryptobox/test", &mut a).unwrap();
        hkdf_expand(&master, b"cryptobox/test", &mut b).unwrap();
        assert_eq!(a, b);
    }
}
