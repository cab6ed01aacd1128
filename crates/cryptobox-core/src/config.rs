use serde::{Deserialize, Serialize};

/// Top-level configuration (loaded from cryptobox.toml).
///
/// These are caller-side *defaults*: the engine itself only consumes explicit
/// `KdfParams`/`CipherSuiteId` values threaded into each job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoBoxConfig {
    pub kdf: KdfConfig,
    pub cipher: CipherConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// Default cipher suite name (e.g. "chacha20-poly1305", "triple",
    /// or a "+"-joined cascade)
    pub default_suite: String,
    /// Allow overwriting an existing destination
    pub overwrite: bool,
    /// Delete the source file after successful encryption/decryption
    pub delete_source: bool,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            default_suite: "chacha20-poly1305".into(),
            overwrite: false,
            delete_source: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
