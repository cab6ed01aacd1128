//! Chunked container streaming: header, framed chunks, final-chunk marker
//!
//! Body framing after the header:
//!
//! ```text
//! [len u32 BE | bit 31 = final][ciphertext ‖ stage tags]  ... repeated
//! ```
//!
//! Plaintext is processed in [`CHUNK_SIZE`] chunks; the last chunk is marked
//! final in both the frame length word and the chunk AAD, so a container cut
//! at a frame boundary still fails (`FileIntegrity`) and a mid-stream frame
//! reflagged as final fails authentication. Sources whose size is an exact
//! chunk multiple get an empty final chunk.
//!
//! Cancellation is checked once per chunk. A cancelled stream returns
//! `Aborted` without writing a partial frame.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use cryptobox_core::{CancelFlag, CbResult, CryptoBoxError, IoPhase, Progress, ProgressFn};
use cryptobox_crypto::header::{parse_prefix, Header, PendingHeader, PREFIX_SIZE};
use cryptobox_crypto::{
    derive_master_key, CipherSuiteId, KdfParams, SuiteCipher, HEADER_TAG_SIZE,
};

/// Plaintext bytes per chunk. Each chunk is one AEAD message per stage, so
/// this also bounds decrypt memory.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Final-chunk marker in the frame length word.
const FINAL_FLAG: u32 = 1 << 31;
const LEN_MASK: u32 = FINAL_FLAG - 1;

/// Parameters for one encryption stream.
pub struct EncryptParams {
    pub suite: CipherSuiteId,
    pub kdf: KdfParams,
    /// Source size if known; drives progress reporting only.
    pub bytes_total: u64,
}

/// Parameters for one decryption stream.
#[derive(Default)]
pub struct DecryptParams {
    /// Ciphertext size if known; drives progress reporting only.
    pub bytes_total: u64,
}

/// What a finished stream processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks: u64,
}

/// Encrypt `reader` into a CryptoBox container on `writer`.
///
/// `src` and `dst` only label I/O errors; this function performs no path
/// operations. The passphrase is rejected if empty before any derivation.
pub fn encrypt_stream(
    reader: &mut dyn Read,
    src: &Path,
    writer: &mut dyn Write,
    dst: &Path,
    passphrase: &SecretString,
    params: EncryptParams,
    cancel: &CancelFlag,
    progress: Option<&ProgressFn>,
) -> CbResult<StreamSummary> {
    check_passphrase(passphrase)?;
    let master = derive_master_key(passphrase, &params.kdf)?;
    let header = Header::new(params.suite, params.kdf);
    let cipher = SuiteCipher::for_suite(&header.suite, &master)?;

    let encoded = header.encode(&master)?;
    writer
        .write_all(&encoded)
        .map_err(|e| CryptoBoxError::io(IoPhase::Write, dst, e))?;

    let mut tally = Progress::new(params.bytes_total);
    let mut summary = StreamSummary {
        bytes_in: 0,
        bytes_out: encoded.len() as u64,
        chunks: 0,
    };
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut index = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(CryptoBoxError::Aborted);
        }
        let n = read_up_to(reader, &mut buf).map_err(|e| CryptoBoxError::io(IoPhase::Read, src, e))?;
        let is_final = n < CHUNK_SIZE;

        let ct = cipher.encrypt_chunk(&header.base_nonce, index, is_final, &buf[..n])?;
        let mut word = ct.len() as u32;
        if is_final {
            word |= FINAL_FLAG;
        }
        writer
            .write_all(&word.to_be_bytes())
            .and_then(|_| writer.write_all(&ct))
            .map_err(|e| CryptoBoxError::io(IoPhase::Write, dst, e))?;

        summary.bytes_in += n as u64;
        summary.bytes_out += 4 + ct.len() as u64;
        summary.chunks += 1;
        tally.advance(n as u64);
        if let Some(cb) = progress {
            cb(tally);
        }

        if is_final {
            break;
        }
        index += 1;
    }

    writer
        .flush()
        .map_err(|e| CryptoBoxError::io(IoPhase::Write, dst, e))?;
    debug!(chunks = summary.chunks, bytes = summary.bytes_in, "encrypt stream complete");
    Ok(summary)
}

/// Decrypt a CryptoBox container from `reader` onto `writer`.
///
/// Error attribution follows parse order: bad magic or framing is
/// `MalformedInput`, an unknown version is `BadVersion` (reported before any
/// key derivation), a bad header tag is `HeaderIntegrity`, a bad chunk is
/// `Authentication`, and a container that ends before its final chunk is
/// `FileIntegrity`. Nothing is written for a chunk until it authenticates.
pub fn decrypt_stream(
    reader: &mut dyn Read,
    src: &Path,
    writer: &mut dyn Write,
    dst: &Path,
    passphrase: &SecretString,
    params: DecryptParams,
    cancel: &CancelFlag,
    progress: Option<&ProgressFn>,
) -> CbResult<StreamSummary> {
    check_passphrase(passphrase)?;

    let mut prefix = [0u8; PREFIX_SIZE];
    read_exact_or(reader, src, &mut prefix, short_header)?;
    let body_len = parse_prefix(&prefix)?;

    let mut body = vec![0u8; body_len as usize];
    read_exact_or(reader, src, &mut body, short_header)?;
    let mut tag = [0u8; HEADER_TAG_SIZE];
    read_exact_or(reader, src, &mut tag, short_header)?;

    let pending = PendingHeader::parse(&prefix, &body, &tag)?;
    let master = derive_master_key(passphrase, pending.kdf())?;
    let header = pending.verify(&master)?;
    let cipher = SuiteCipher::for_suite(&header.suite, &master)?;

    let mut tally = Progress::new(params.bytes_total);
    let mut summary = StreamSummary {
        bytes_in: (PREFIX_SIZE + body_len as usize + HEADER_TAG_SIZE) as u64,
        bytes_out: 0,
        chunks: 0,
    };
    tally.advance(summary.bytes_in);
    let max_frame = (CHUNK_SIZE + cipher.overhead()) as u32;
    let mut index = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(CryptoBoxError::Aborted);
        }
        let mut word = [0u8; 4];
        read_exact_or(reader, src, &mut word, |_| CryptoBoxError::FileIntegrity)?;
        let word = u32::from_be_bytes(word);
        let is_final = word & FINAL_FLAG != 0;
        let len = word & LEN_MASK;
        if len < cipher.overhead() as u32 || len > max_frame {
            return Err(CryptoBoxError::MalformedInput(format!(
                "implausible chunk frame length: {len}"
            )));
        }

        let mut ct = vec![0u8; len as usize];
        read_exact_or(reader, src, &mut ct, |_| CryptoBoxError::FileIntegrity)?;

        let pt = cipher.decrypt_chunk(&header.base_nonce, index, is_final, &ct)?;
        writer
            .write_all(&pt)
            .map_err(|e| CryptoBoxError::io(IoPhase::Write, dst, e))?;

        summary.bytes_in += 4 + len as u64;
        summary.bytes_out += pt.len() as u64;
        summary.chunks += 1;
        tally.advance(4 + len as u64);
        if let Some(cb) = progress {
            cb(tally);
        }

        if is_final {
            break;
        }
        index += 1;
    }

    // anything after the final chunk is not ours
    let mut probe = [0u8; 1];
    match reader.read(&mut probe) {
        Ok(0) => {}
        Ok(_) => {
            return Err(CryptoBoxError::MalformedInput(
                "trailing data after the final chunk".into(),
            ))
        }
        Err(e) => return Err(CryptoBoxError::io(IoPhase::Read, src, e)),
    }

    writer
        .flush()
        .map_err(|e| CryptoBoxError::io(IoPhase::Write, dst, e))?;
    debug!(chunks = summary.chunks, bytes = summary.bytes_out, "decrypt stream complete");
    Ok(summary)
}

fn check_passphrase(passphrase: &SecretString) -> CbResult<()> {
    if passphrase.expose_secret().is_empty() {
        return Err(CryptoBoxError::EmptyPassphrase);
    }
    Ok(())
}

fn short_header(_: PathBuf) -> CryptoBoxError {
    CryptoBoxError::MalformedInput("container ends inside the header".into())
}

/// Fill `buf` from `reader`, retrying short reads, until full or EOF.
fn read_up_to(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// `read_exact` with taxonomy mapping: premature EOF becomes the caller's
/// chosen variant, every other I/O error keeps its phase and path.
fn read_exact_or(
    reader: &mut dyn Read,
    src: &Path,
    buf: &mut [u8],
    on_eof: fn(PathBuf) -> CryptoBoxError,
) -> CbResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            on_eof(src.to_path_buf())
        } else {
            CryptoBoxError::io(IoPhase::Read, src, e)
        }
    })
}
