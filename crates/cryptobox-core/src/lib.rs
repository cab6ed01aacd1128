//! cryptobox-core: types shared across the CryptoBox workspace
//!
//! Holds the error taxonomy, the configuration structs loaded from TOML, and
//! the small job-facing types (operation, progress, cancellation flag). No
//! cryptography lives here.

pub mod config;
pub mod error;
pub mod types;

pub use config::CryptoBoxConfig;
pub use error::{CbResult, CryptoBoxError, IoPhase};
pub use types::{CancelFlag, Operation, Progress, ProgressFn};
