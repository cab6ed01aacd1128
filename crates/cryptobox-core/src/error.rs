use std::path::PathBuf;

use thiserror::Error;

pub type CbResult<T> = Result<T, CryptoBoxError>;

/// Which file operation an I/O failure happened in. Preserved for
/// diagnostics; callers show it together with the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoPhase {
    OpenSource,
    OpenDestination,
    Read,
    Write,
    Finalize,
}

impl std::fmt::Display for IoPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IoPhase::OpenSource => "open-for-reading",
            IoPhase::OpenDestination => "open-for-writing",
            IoPhase::Read => "read",
            IoPhase::Write => "write",
            IoPhase::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// The CryptoBox failure taxonomy.
///
/// Header failures (`BadVersion`, `HeaderIntegrity`, `MalformedInput`) are
/// always distinguishable from body failures (`Authentication`,
/// `FileIntegrity`) so callers learn *where* verification failed. Messages
/// name the category only, never which byte or field differed.
#[derive(Debug, Error)]
pub enum CryptoBoxError {
    #[error("I/O error during {phase} on {}: {source}", path.display())]
    Io {
        phase: IoPhase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("passphrase must not be empty")]
    EmptyPassphrase,

    #[error("key derivation failed: {0}")]
    DerivationFailure(String),

    #[error("bad CryptoBox version: {0}")]
    BadVersion(u16),

    #[error("header integrity failure: wrong passphrase, or the header is corrupted")]
    HeaderIntegrity,

    #[error("authentication failure: wrong passphrase, or data are corrupted")]
    Authentication,

    #[error("file integrity failure: container ends before the final chunk")]
    FileIntegrity,

    #[error("not a CryptoBox container: {0}")]
    MalformedInput(String),

    #[error("aborted by user")]
    Aborted,
}

impl CryptoBoxError {
    pub fn io(phase: IoPhase, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CryptoBoxError::Io {
            phase,
            path: path.into(),
            source,
        }
    }

    /// True for user-initiated cancellation, which is terminal but not a
    /// failure for cleanup/reporting purposes.
    pub fn is_abort(&self) -> bool {
        matches!(self, CryptoBoxError::Aborted)
    }
}
