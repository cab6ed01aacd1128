//! cryptobox-engine: streaming container encrypt/decrypt
//!
//! Two layers:
//!   - [`stream`]: chunked encrypt/decrypt over any `Read`/`Write` pair,
//!     with cooperative cancellation and per-chunk progress
//!   - [`job`]: file jobs on top of the stream layer (no-clobber checks,
//!     temp-file staging with atomic rename, source deletion on success)
//!     and a [`job::JobController`] that runs queued jobs on a worker
//!     thread with abort support
//!
//! The stream layer never touches the filesystem itself; paths passed to it
//! are labels for error attribution only.

pub mod job;
pub mod stream;

pub use job::{run_job, JobController, JobEvent, JobReport, JobSpec};
pub use stream::{
    decrypt_stream, encrypt_stream, DecryptParams, EncryptParams, StreamSummary, CHUNK_SIZE,
};
