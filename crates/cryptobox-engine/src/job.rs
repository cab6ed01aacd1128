//! File jobs and the background job controller
//!
//! A job encrypts or decrypts one file. Output is staged in a temp file in
//! the destination's directory and promoted with an atomic rename only after
//! the stream completes, so a failed or aborted job never leaves a partial
//! destination behind. Without `overwrite` the rename refuses to clobber,
//! which also closes the race against a destination created mid-job.
//!
//! [`JobController`] runs jobs one at a time on a worker thread, in
//! submission order. Each job gets its own [`CancelFlag`]; aborting a job
//! that is still queued skips it entirely.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use cryptobox_core::config::KdfConfig;
use cryptobox_core::{CancelFlag, CbResult, CryptoBoxError, IoPhase, Operation, ProgressFn};
use cryptobox_crypto::{CipherSuiteId, KdfParams};

use crate::stream::{decrypt_stream, encrypt_stream, DecryptParams, EncryptParams};

/// Everything needed to run one file job.
pub struct JobSpec {
    pub operation: Operation,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub passphrase: SecretString,
    /// Encryption only; decryption reads the suite from the header.
    pub suite: CipherSuiteId,
    pub kdf: KdfConfig,
    pub overwrite: bool,
    pub delete_source: bool,
}

/// Outcome of a successful job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Run one job to completion on the calling thread.
pub fn run_job(
    spec: &JobSpec,
    cancel: &CancelFlag,
    progress: Option<&ProgressFn>,
) -> CbResult<JobReport> {
    let started = Instant::now();
    info!(
        source = %spec.source.display(),
        destination = %spec.destination.display(),
        operation = ?spec.operation,
        "job starting"
    );

    if !spec.overwrite && spec.destination.exists() {
        return Err(CryptoBoxError::DestinationExists(spec.destination.clone()));
    }

    let source = File::open(&spec.source)
        .map_err(|e| CryptoBoxError::io(IoPhase::OpenSource, &spec.source, e))?;
    let bytes_total = source
        .metadata()
        .map_err(|e| CryptoBoxError::io(IoPhase::OpenSource, &spec.source, e))?
        .len();
    let mut reader = BufReader::new(source);

    let staging_dir = spec
        .destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut staged = NamedTempFile::new_in(&staging_dir)
        .map_err(|e| CryptoBoxError::io(IoPhase::OpenDestination, &spec.destination, e))?;

    let summary = {
        let mut writer = BufWriter::new(staged.as_file_mut());
        let summary = match spec.operation {
            Operation::Encrypt => encrypt_stream(
                &mut reader,
                &spec.source,
                &mut writer,
                &spec.destination,
                &spec.passphrase,
                EncryptParams {
                    suite: spec.suite.clone(),
                    kdf: KdfParams::generate(
                        spec.kdf.argon2_mem_cost_kib,
                        spec.kdf.argon2_time_cost,
                        spec.kdf.argon2_parallelism,
                    ),
                    bytes_total,
                },
                cancel,
                progress,
            )?,
            Operation::Decrypt => decrypt_stream(
                &mut reader,
                &spec.source,
                &mut writer,
                &spec.destination,
                &spec.passphrase,
                DecryptParams { bytes_total },
                cancel,
                progress,
            )?,
        };
        writer
            .flush()
            .map_err(|e| CryptoBoxError::io(IoPhase::Write, &spec.destination, e))?;
        summary
    };

    promote(staged, spec)?;

    if spec.delete_source {
        std::fs::remove_file(&spec.source)
            .map_err(|e| CryptoBoxError::io(IoPhase::Finalize, &spec.source, e))?;
        debug!(source = %spec.source.display(), "source deleted after success");
    }

    let report = JobReport {
        source: spec.source.clone(),
        destination: spec.destination.clone(),
        bytes_in: summary.bytes_in,
        bytes_out: summary.bytes_out,
        chunks: summary.chunks,
        elapsed: started.elapsed(),
    };
    info!(
        destination = %report.destination.display(),
        bytes_out = report.bytes_out,
        chunks = report.chunks,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "job complete"
    );
    Ok(report)
}

/// Atomically move the staged output into place. The temp file lives in the
/// destination directory, so the rename never crosses filesystems.
fn promote(staged: NamedTempFile, spec: &JobSpec) -> CbResult<()> {
    let result = if spec.overwrite {
        staged.persist(&spec.destination).map(|_| ())
    } else {
        staged.persist_noclobber(&spec.destination).map(|_| ())
    };
    result.map_err(|e| {
        if !spec.overwrite && e.error.kind() == ErrorKind::AlreadyExists {
            CryptoBoxError::DestinationExists(spec.destination.clone())
        } else {
            CryptoBoxError::io(IoPhase::Finalize, &spec.destination, e.error)
        }
    })
}

// ── JobController ─────────────────────────────────────────────────────────

/// Lifecycle notifications delivered from the worker thread.
pub enum JobEvent {
    Started {
        id: u64,
    },
    Progress {
        id: u64,
        progress: cryptobox_core::Progress,
    },
    Finished {
        id: u64,
        result: CbResult<JobReport>,
    },
}

pub type JobEventFn = Arc<dyn Fn(JobEvent) + Send + Sync>;

enum Command {
    Run(u64, JobSpec),
    Shutdown,
}

/// Serial job queue on a dedicated worker thread.
///
/// Jobs run in submission order. [`JobController::abort`] flips the job's
/// cancel flag: a running job stops at its next chunk boundary, a queued job
/// is skipped and reported as `Aborted` without opening any file.
pub struct JobController {
    tx: Sender<Command>,
    worker: Option<thread::JoinHandle<()>>,
    next_id: AtomicU64,
    cancels: Arc<Mutex<HashMap<u64, CancelFlag>>>,
}

impl JobController {
    pub fn new(on_event: JobEventFn) -> Self {
        let (tx, rx) = mpsc::channel::<Command>();
        let cancels: Arc<Mutex<HashMap<u64, CancelFlag>>> = Arc::default();
        let worker_cancels = cancels.clone();

        let worker = thread::Builder::new()
            .name("cryptobox-jobs".into())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    let (id, spec) = match command {
                        Command::Run(id, spec) => (id, spec),
                        Command::Shutdown => break,
                    };
                    let cancel = worker_cancels
                        .lock()
                        .map(|map| map.get(&id).cloned())
                        .ok()
                        .flatten()
                        .unwrap_or_default();

                    let result = if cancel.is_cancelled() {
                        debug!(id, "job aborted while queued");
                        Err(CryptoBoxError::Aborted)
                    } else {
                        (*on_event)(JobEvent::Started { id });
                        let sink = on_event.clone();
                        let forward: ProgressFn = Box::new(move |progress| {
                            (*sink)(JobEvent::Progress { id, progress });
                        });
                        run_job(&spec, &cancel, Some(&forward))
                    };
                    if let Err(e) = &result {
                        if e.is_abort() {
                            info!(id, "job aborted");
                        } else {
                            warn!(id, error = %e, "job failed");
                        }
                    }
                    if let Ok(mut map) = worker_cancels.lock() {
                        map.remove(&id);
                    }
                    (*on_event)(JobEvent::Finished { id, result });
                }
            })
            .unwrap_or_else(|e| panic!("spawning job worker thread: {e}"));

        Self {
            tx,
            worker: Some(worker),
            next_id: AtomicU64::new(1),
            cancels,
        }
    }

    /// Queue a job; returns its id for [`JobController::abort`] and event
    /// correlation.
    pub fn submit(&self, spec: JobSpec) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut map) = self.cancels.lock() {
            map.insert(id, CancelFlag::new());
        }
        // send only fails after shutdown, when no new work is accepted anyway
        let _ = self.tx.send(Command::Run(id, spec));
        id
    }

    /// Request cancellation of a queued or running job. Idempotent; unknown
    /// ids (already finished) are a no-op.
    pub fn abort(&self, id: u64) {
        if let Ok(map) = self.cancels.lock() {
            if let Some(flag) = map.get(&id) {
                flag.cancel();
            }
        }
    }

    /// Drain the queue and stop the worker.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
