//! Cipher suites: AEAD primitives, cascades, per-chunk encrypt/decrypt
//!
//! Every suite member exposes the same chunk operations. A chunk's AAD binds
//! its counter and the final-chunk flag, so reordering, truncation at a chunk
//! boundary, and reflagging a mid-stream chunk as final are all detectable.
//!
//! Cascade composition ("Triple Encryption"): on encrypt, stage k's output
//! ciphertext becomes stage k+1's input plaintext; each stage has its own
//! HKDF subkey and a stage-distinguished nonce. Decrypt applies the stages in
//! strictly reverse order and fails closed: the first failing stage aborts
//! the chunk and no intermediate plaintext escapes.

use std::fmt;
use std::str::FromStr;

use aes::Aes256;
use aes_gcm::aead::consts::U12;
use aes_gcm::{Aes256Gcm, AesGcm};
use aes_siv::{Aes256SivAead, SivAead};
use chacha20poly1305::aead::generic_array::typenum::Unsigned;
use chacha20poly1305::aead::{Aead, AeadCore, Key, KeyInit, Nonce, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use cmac::Cmac;
use eax::Eax;
use serde::{Deserialize, Serialize};
use serpent::Serpent;
use zeroize::Zeroize;

use cryptobox_core::{CbResult, CryptoBoxError};

use crate::keys::{hkdf_expand, stage_info};
use crate::{MasterKey, BASE_NONCE_SIZE, TAG_SIZE};

/// Serpent in GCM mode (96-bit nonces, like AES-GCM)
type SerpentGcm = AesGcm<Serpent, U12>;
/// Serpent in SIV mode with CMAC
type SerpentSiv = SivAead<Serpent, Cmac<Serpent>>;
/// Serpent in EAX mode
type SerpentEax = Eax<Serpent>;
/// AES-256 in EAX mode
type Aes256Eax = Eax<Aes256>;

/// A single AEAD primitive variant. Closed set; resolved once at job start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherId {
    Chacha20Poly1305,
    Aes256Gcm,
    SerpentGcm,
    SerpentSiv,
    SerpentEax,
    Aes256Siv,
    Aes256Eax,
}

impl CipherId {
    pub const ALL: [CipherId; 7] = [
        CipherId::Chacha20Poly1305,
        CipherId::Aes256Gcm,
        CipherId::SerpentGcm,
        CipherId::SerpentSiv,
        CipherId::SerpentEax,
        CipherId::Aes256Siv,
        CipherId::Aes256Eax,
    ];

    /// Stable wire/CLI name; also feeds the per-stage HKDF context string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherId::Chacha20Poly1305 => "chacha20-poly1305",
            CipherId::Aes256Gcm => "aes-256-gcm",
            CipherId::SerpentGcm => "serpent-gcm",
            CipherId::SerpentSiv => "serpent-siv",
            CipherId::SerpentEax => "serpent-eax",
            CipherId::Aes256Siv => "aes-256-siv",
            CipherId::Aes256Eax => "aes-256-eax",
        }
    }
}

impl fmt::Display for CipherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherId {
    type Err = CryptoBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CipherId::ALL
            .iter()
            .find(|id| id.as_str() == s)
            .copied()
            .ok_or_else(|| CryptoBoxError::MalformedInput(format!("unknown cipher: {s}")))
    }
}

/// A cipher suite: one primitive, or an ordered cascade of primitives.
///
/// A cascade holds `CipherId`s, never suites, so nesting is impossible by
/// construction. Length ≥ 2 is enforced by [`CipherSuiteId::cascade`] and
/// re-checked when a header is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherSuiteId {
    Single(CipherId),
    Cascade(Vec<CipherId>),
}

impl CipherSuiteId {
    /// The "Triple Encryption" preset.
    pub fn triple() -> Self {
        CipherSuiteId::Cascade(vec![
            CipherId::Chacha20Poly1305,
            CipherId::Aes256Gcm,
            CipherId::SerpentGcm,
        ])
    }

    pub fn cascade(stages: Vec<CipherId>) -> CbResult<Self> {
        if stages.len() < 2 {
            return Err(CryptoBoxError::MalformedInput(
                "cascade must have at least 2 stages".into(),
            ));
        }
        Ok(CipherSuiteId::Cascade(stages))
    }

    /// The ordered stage list (a single suite is a one-stage list).
    pub fn stage_ids(&self) -> Vec<CipherId> {
        match self {
            CipherSuiteId::Single(id) => vec![*id],
            CipherSuiteId::Cascade(ids) => ids.clone(),
        }
    }

    /// Re-check invariants on untrusted input (header parsing).
    pub fn validate(&self) -> CbResult<()> {
        match self {
            CipherSuiteId::Single(_) => Ok(()),
            CipherSuiteId::Cascade(ids) if ids.len() >= 2 => Ok(()),
            CipherSuiteId::Cascade(_) => Err(CryptoBoxError::MalformedInput(
                "cascade must have at least 2 stages".into(),
            )),
        }
    }
}

impl fmt::Display for CipherSuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherSuiteId::Single(id) => write!(f, "{id}"),
            CipherSuiteId::Cascade(ids) => {
                let names: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                f.write_str(&names.join("+"))
            }
        }
    }
}

impl FromStr for CipherSuiteId {
    type Err = CryptoBoxError;

    /// Accepts a single suite name, `triple`, or a `+`-joined cascade
    /// (e.g. `aes-256-gcm+serpent-eax`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "triple" {
            return Ok(CipherSuiteId::triple());
        }
        if s.contains('+') {
            let stages = s
                .split('+')
                .map(CipherId::from_str)
                .collect::<CbResult<Vec<_>>>()?;
            return CipherSuiteId::cascade(stages);
        }
        Ok(CipherSuiteId::Single(CipherId::from_str(s)?))
    }
}

/// Object-safe view over one keyed AEAD stage.
trait ChunkAead: Send + Sync {
    fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> CbResult<Vec<u8>>;
    fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> CbResult<Vec<u8>>;
    fn nonce_len(&self) -> usize;
}

struct AeadStage<A> {
    cipher: A,
    nonce_len: usize,
}

impl<A: Aead + Send + Sync> ChunkAead for AeadStage<A> {
    fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> CbResult<Vec<u8>> {
        let nonce = Nonce::<A>::from_slice(nonce);
        self.cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoBoxError::MalformedInput("chunk exceeds AEAD limits".into()))
    }

    fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> CbResult<Vec<u8>> {
        let nonce = Nonce::<A>::from_slice(nonce);
        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoBoxError::Authentication)
    }

    fn nonce_len(&self) -> usize {
        self.nonce_len
    }
}

/// Key a stage AEAD with its HKDF subkey, sized to the AEAD's native key length.
fn new_stage<A>(master: &MasterKey, info: &[u8]) -> CbResult<Box<dyn ChunkAead>>
where
    A: Aead + AeadCore + KeyInit + Send + Sync + 'static,
{
    let mut key = Key::<A>::default();
    hkdf_expand(master, info, key.as_mut_slice())?;
    let cipher = A::new(&key);
    key.as_mut_slice().zeroize();
    Ok(Box::new(AeadStage {
        nonce_len: <A as AeadCore>::NonceSize::to_usize(),
        cipher,
    }))
}

fn build_stage(id: CipherId, stage: usize, master: &MasterKey) -> CbResult<Box<dyn ChunkAead>> {
    let info = stage_info(stage, id);
    match id {
        CipherId::Chacha20Poly1305 => new_stage::<ChaCha20Poly1305>(master, &info),
        CipherId::Aes256Gcm => new_stage::<Aes256Gcm>(master, &info),
        CipherId::SerpentGcm => new_stage::<SerpentGcm>(master, &info),
        CipherId::SerpentSiv => new_stage::<SerpentSiv>(master, &info),
        CipherId::SerpentEax => new_stage::<SerpentEax>(master, &info),
        CipherId::Aes256Siv => new_stage::<Aes256SivAead>(master, &info),
        CipherId::Aes256Eax => new_stage::<Aes256Eax>(master, &info),
    }
}

/// Keyed, ready-to-run suite: one AEAD instance per stage.
pub struct SuiteCipher {
    stages: Vec<Box<dyn ChunkAead>>,
}

impl SuiteCipher {
    pub fn for_suite(suite: &CipherSuiteId, master: &MasterKey) -> CbResult<Self> {
        suite.validate()?;
        let stages = suite
            .stage_ids()
            .into_iter()
            .enumerate()
            .map(|(k, id)| build_stage(id, k, master))
            .collect::<CbResult<Vec<_>>>()?;
        Ok(Self { stages })
    }

    /// Ciphertext expansion per chunk: one tag per stage.
    pub fn overhead(&self) -> usize {
        self.stages.len() * TAG_SIZE
    }

    pub fn encrypt_chunk(
        &self,
        base_nonce: &[u8; BASE_NONCE_SIZE],
        index: u64,
        is_final: bool,
        plaintext: &[u8],
    ) -> CbResult<Vec<u8>> {
        let aad = chunk_aad(index, is_final);
        let mut data = plaintext.to_vec();
        for (k, stage) in self.stages.iter().enumerate() {
            let nonce = derive_nonce(base_nonce, k as u8, index, stage.nonce_len());
            data = stage.seal(&nonce, &aad, &data)?;
        }
        Ok(data)
    }

    pub fn decrypt_chunk(
        &self,
        base_nonce: &[u8; BASE_NONCE_SIZE],
        index: u64,
        is_final: bool,
        ciphertext: &[u8],
    ) -> CbResult<Vec<u8>> {
        let aad = chunk_aad(index, is_final);
        let mut data = ciphertext.to_vec();
        for (k, stage) in self.stages.iter().enumerate().rev() {
            let nonce = derive_nonce(base_nonce, k as u8, index, stage.nonce_len());
            data = stage.open(&nonce, &aad, &data)?;
        }
        Ok(data)
    }
}

/// AAD: chunk counter (8 bytes BE) || final flag (1 byte)
fn chunk_aad(index: u64, is_final: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8] = is_final as u8;
    aad
}

/// Deterministic per-stage chunk nonce.
///
/// Stage index XORed into byte 7, the 64-bit counter into bytes 8..16, then
/// truncated from the front to the AEAD's nonce length. Unique per
/// (stage key, counter) for every nonce length ≥ 9 used here (12 and 16).
fn derive_nonce(base: &[u8; BASE_NONCE_SIZE], stage: u8, counter: u64, len: usize) -> Vec<u8> {
    debug_assert!((9..=BASE_NONCE_SIZE).contains(&len));
    let mut block = *base;
    block[7] ^= stage;
    for (i, b) in counter.to_be_bytes().iter().enumerate() {
        block[8 + i] ^= b;
    }
    block[BASE_NONCE_SIZE - len..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn test_master_key() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    fn test_base_nonce() -> [u8; BASE_NONCE_SIZE] {
        [0xA5u8; BASE_NONCE_SIZE]
    }

    #[test]
    fn test_roundtrip_every_single_suite() {
        let master = test_master_key();
        let nonce = test_base_nonce();
        let plaintext = b"hello, encrypted world!";

        for id in CipherId::ALL {
            let suite = CipherSuiteId::Single(id);
            let cipher = SuiteCipher::for_suite(&suite, &master).unwrap();

            let ct = cipher.encrypt_chunk(&nonce, 0, true, plaintext).unwrap();
            assert_ne!(&ct[..plaintext.len().min(ct.len())], &plaintext[..]);
            assert_eq!(ct.len(), plaintext.len() + cipher.overhead());

            let pt = cipher.decrypt_chunk(&nonce, 0, true, &ct).unwrap();
            assert_eq!(pt, plaintext, "roundtrip failed for {id}");
        }
    }

    #[test]
    fn test_roundtrip_empty_chunk() {
        let master = test_master_key();
        let nonce = test_base_nonce();
        let cipher =
            SuiteCipher::for_suite(&CipherSuiteId::Single(CipherId::Chacha20Poly1305), &master)
                .unwrap();

        let ct = cipher.encrypt_chunk(&nonce, 0, true, b"").unwrap();
        let pt = cipher.decrypt_chunk(&nonce, 0, true, &ct).unwrap();
        assert_eq!(pt, b"");
    }

    #[test]
    fn test_triple_cascade_roundtrip() {
        let master = test_master_key();
        let nonce = test_base_nonce();
        let cipher = SuiteCipher::for_suite(&CipherSuiteId::triple(), &master).unwrap();

        let plaintext = vec![0x5au8; 1000];
        let ct = cipher.encrypt_chunk(&nonce, 3, false, &plaintext).unwrap();
        // one tag per stage
        assert_eq!(ct.len(), plaintext.len() + 3 * TAG_SIZE);

        let pt = cipher.decrypt_chunk(&nonce, 3, false, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn test_cascade_order_sensitivity() {
        let master = test_master_key();
        let nonce = test_base_nonce();

        let forward = CipherSuiteId::cascade(vec![
            CipherId::Chacha20Poly1305,
            CipherId::Aes256Gcm,
            CipherId::SerpentGcm,
        ])
        .unwrap();
        let reversed = CipherSuiteId::cascade(vec![
            CipherId::SerpentGcm,
            CipherId::Aes256Gcm,
            CipherId::Chacha20Poly1305,
        ])
        .unwrap();

        let enc = SuiteCipher::for_suite(&forward, &master).unwrap();
        let dec = SuiteCipher::for_suite(&reversed, &master).unwrap();

        let ct = enc.encrypt_chunk(&nonce, 0, true, b"order matters").unwrap();

        match dec.decrypt_chunk(&nonce, 0, true, &ct) {
            Err(CryptoBoxError::Authentication) => {}
            other => panic!("reversed cascade must fail authentication, got {other:?}"),
        }

        let pt = enc.decrypt_chunk(&nonce, 0, true, &ct).unwrap();
        assert_eq!(pt, b"order matters");
    }

    #[test]
    fn test_every_triple_ordering_roundtrips() {
        let master = test_master_key();
        let nonce = test_base_nonce();
        let stages = [
            CipherId::Chacha20Poly1305,
            CipherId::Aes256Gcm,
            CipherId::SerpentGcm,
        ];
        for &a in &stages {
            for &b in &stages {
                for &c in &stages {
                    if a == b || b == c || a == c {
                        continue;
                    }
                    let suite = CipherSuiteId::cascade(vec![a, b, c]).unwrap();
                    let cipher = SuiteCipher::for_suite(&suite, &master).unwrap();
                    let ct = cipher.encrypt_chunk(&nonce, 0, true, b"permuted").unwrap();
                    let pt = cipher.decrypt_chunk(&nonce, 0, true, &ct).unwrap();
                    assert_eq!(pt, b"permuted", "ordering {a}+{b}+{c} failed");
                }
            }
        }
    }

    #[test]
    fn test_wrong_chunk_index_fails() {
        let master = test_master_key();
        let nonce = test_base_nonce();
        let cipher =
            SuiteCipher::for_suite(&CipherSuiteId::Single(CipherId::Aes256Gcm), &master).unwrap();

        let ct = cipher.encrypt_chunk(&nonce, 0, false, b"secret data").unwrap();
        let result = cipher.decrypt_chunk(&nonce, 1, false, &ct);
        assert!(result.is_err(), "wrong chunk index must fail (AAD mismatch)");
    }

    #[test]
    fn test_final_flag_bound_into_aad() {
        let master = test_master_key();
        let nonce = test_base_nonce();
        let cipher =
            SuiteCipher::for_suite(&CipherSuiteId::Single(CipherId::Aes256Eax), &master).unwrap();

        let ct = cipher.encrypt_chunk(&nonce, 5, false, b"mid-stream").unwrap();
        match cipher.decrypt_chunk(&nonce, 5, true, &ct) {
            Err(CryptoBoxError::Authentication) => {}
            other => panic!("reflagging a chunk as final must fail, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let master = test_master_key();
        let nonce = test_base_nonce();
        let cipher = SuiteCipher::for_suite(&CipherSuiteId::triple(), &master).unwrap();

        let mut ct = cipher.encrypt_chunk(&nonce, 0, true, b"secret data").unwrap();
        ct[4] ^= 0x01;

        match cipher.decrypt_chunk(&nonce, 0, true, &ct) {
            Err(CryptoBoxError::Authentication) => {}
            other => panic!("tampered ciphertext must fail closed, got {other:?}"),
        }
    }

    #[test]
    fn test_cascade_requires_two_stages() {
        assert!(CipherSuiteId::cascade(vec![CipherId::Aes256Gcm]).is_err());
        assert!(CipherSuiteId::Cascade(vec![CipherId::Aes256Gcm])
            .validate()
            .is_err());
        assert!(CipherSuiteId::triple().validate().is_ok());
    }

    #[test]
    fn test_nonce_derivation_unique() {
        let base = test_base_nonce();
        let mut seen = std::collections::HashSet::new();
        for stage in 0..3u8 {
            for counter in 0..64u64 {
                let nonce = derive_nonce(&base, stage, counter, 12);
                assert_eq!(nonce.len(), 12);
                assert!(
                    seen.insert(nonce),
                    "nonce reuse at stage {stage} counter {counter}"
                );
            }
        }
    }

    #[test]
    fn test_suite_parse() {
        assert_eq!(
            "chacha20-poly1305".parse::<CipherSuiteId>().unwrap(),
            CipherSuiteId::Single(CipherId::Chacha20Poly1305)
        );
        assert_eq!(
            "triple".parse::<CipherSuiteId>().unwrap(),
            CipherSuiteId::triple()
        );
        assert_eq!(
            "aes-256-siv+serpent-eax".parse::<CipherSuiteId>().unwrap(),
            CipherSuiteId::Cascade(vec![CipherId::Aes256Siv, CipherId::SerpentEax])
        );
        assert!("rot13".parse::<CipherSuiteId>().is_err());
        assert!("aes-256-gcm+".parse::<CipherSuiteId>().is_err());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn prop_triple_roundtrip_any_chunk(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096),
            index in 0u64..u64::MAX,
            is_final: bool,
        ) {
            let cipher =
                SuiteCipher::for_suite(&CipherSuiteId::triple(), &test_master_key()).unwrap();
            let nonce = test_base_nonce();
            let ct = cipher.encrypt_chunk(&nonce, index, is_final, &data).unwrap();
            let pt = cipher.decrypt_chunk(&nonce, index, is_final, &ct).unwrap();
            proptest::prop_assert_eq!(pt, data);
        }
    }

    #[test]
    fn test_suite_display_roundtrip() {
        for s in ["serpent-siv", "aes-256-gcm+serpent-gcm"] {
            let suite: CipherSuiteId = s.parse().unwrap();
            assert_eq!(suite.to_string(), s);
        }
    }
}
