//! cbox: CryptoBox container CLI
//!
//! Primary surface:
//!   cbox <SOURCE> --encrypt [--output <PATH>] [--cipher <SUITE>] ...
//!   cbox <SOURCE> --decrypt [--output <PATH>] ...
//!
//! Utility subcommands:
//!   cbox inspect <container>   - show header fields (no passphrase needed)
//!   cbox suites                - list available cipher suites
//!   cbox config show           - display the effective configuration
//!
//! The passphrase comes from `--passphrase`, else the CBOX_PASSPHRASE
//! environment variable, else an interactive prompt (with confirmation when
//! encrypting).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;

use cryptobox_core::config::CryptoBoxConfig;
use cryptobox_core::{CancelFlag, Operation, ProgressFn};
use cryptobox_crypto::header::{parse_prefix, PREFIX_SIZE};
use cryptobox_crypto::{CipherId, CipherSuiteId, HEADER_TAG_SIZE};
use cryptobox_engine::{run_job, JobSpec};

const CONTAINER_EXTENSION: &str = "cbox";
const PASSPHRASE_ENV: &str = "CBOX_PASSPHRASE";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cbox",
    version,
    about = "CryptoBox: passphrase-based authenticated file encryption",
    long_about = "cbox: encrypt files into versioned, authenticated, streaming \
                  CryptoBox containers and decrypt them back",
    group(ArgGroup::new("mode").args(["encrypt", "decrypt"])),
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// File to encrypt or decrypt
    source: Option<PathBuf>,

    /// Encrypt the source into a container
    #[arg(long, short = 'e')]
    encrypt: bool,

    /// Decrypt the source container
    #[arg(long, short = 'd')]
    decrypt: bool,

    /// Destination path (default: <source>.cbox when encrypting, the source
    /// without its .cbox extension when decrypting)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Passphrase value. Prefer CBOX_PASSPHRASE or the interactive prompt;
    /// command lines are visible to other local processes.
    #[arg(long)]
    passphrase: Option<String>,

    /// Cipher suite: a suite name, "triple", or a '+'-joined cascade
    /// (encryption only; decryption reads the suite from the header)
    #[arg(long)]
    cipher: Option<String>,

    /// Argon2 time cost / iterations (overrides config)
    #[arg(long)]
    iterations: Option<u32>,

    /// Argon2 memory cost in KiB (overrides config)
    #[arg(long)]
    memory_kib: Option<u32>,

    /// Argon2 parallelism / lanes (overrides config)
    #[arg(long)]
    parallelism: Option<u32>,

    /// Replace the destination if it exists
    #[arg(long, short = 'f')]
    force: bool,

    /// Delete the source file after success
    #[arg(long)]
    delete_source: bool,

    /// Path to the cryptobox.toml configuration file
    #[arg(long, short = 'c', env = "CBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a container's header: version, suite, KDF parameters
    Inspect {
        /// Container to inspect
        container: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List available cipher suites
    Suites,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Display the effective configuration as TOML
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;
    init_logging(&config.log.level, &config.log.format);

    if let Some(command) = cli.command {
        return match command {
            Commands::Inspect { container, json } => cmd_inspect(&container, json),
            Commands::Suites => cmd_suites(),
            Commands::Config {
                action: ConfigAction::Show,
            } => cmd_config_show(&config, &config_path),
        };
    }

    let source = cli
        .source
        .clone()
        .context("a source path is required (see `cbox --help`)")?;
    let operation = match (cli.encrypt, cli.decrypt) {
        (true, false) => Operation::Encrypt,
        (false, true) => Operation::Decrypt,
        _ => anyhow::bail!("exactly one of --encrypt or --decrypt is required"),
    };

    let spec = build_job_spec(&cli, &config, source, operation)?;
    let verb = match operation {
        Operation::Encrypt => "encrypting",
        Operation::Decrypt => "decrypting",
    };
    cmd_run(spec, verb)
}

fn build_job_spec(
    cli: &Cli,
    config: &CryptoBoxConfig,
    source: PathBuf,
    operation: Operation,
) -> Result<JobSpec> {
    let mut kdf = config.kdf.clone();
    if let Some(mem) = cli.memory_kib {
        kdf.argon2_mem_cost_kib = mem;
    }
    if let Some(time) = cli.iterations {
        kdf.argon2_time_cost = time;
    }
    if let Some(lanes) = cli.parallelism {
        kdf.argon2_parallelism = lanes;
    }

    let suite = cli
        .cipher
        .as_deref()
        .unwrap_or(&config.cipher.default_suite)
        .parse::<CipherSuiteId>()?;

    let destination = match (&cli.output, operation) {
        (Some(out), _) => out.clone(),
        (None, Operation::Encrypt) => default_encrypt_destination(&source),
        (None, Operation::Decrypt) => default_decrypt_destination(&source)?,
    };

    Ok(JobSpec {
        operation,
        source,
        destination,
        passphrase: read_passphrase(cli.passphrase.as_deref(), operation == Operation::Encrypt)?,
        suite,
        kdf,
        overwrite: cli.force || config.cipher.overwrite,
        delete_source: cli.delete_source || config.cipher.delete_source,
    })
}

// ── Config loading ────────────────────────────────────────────────────────────

fn default_config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(".config")
        });
    base.join("cryptobox").join("config.toml")
}

fn load_config(path: &Path) -> Result<CryptoBoxConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(CryptoBoxConfig::default())
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// ── Passphrase input ──────────────────────────────────────────────────────────

/// `--passphrase` first, environment second, interactive prompt last.
/// Encryption prompts twice and refuses mismatches; an empty passphrase is
/// rejected either way by the engine.
fn read_passphrase(flag: Option<&str>, confirm: bool) -> Result<SecretString> {
    if let Some(value) = flag {
        return Ok(SecretString::from(value.to_string()));
    }
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        return Ok(SecretString::from(value));
    }
    let first = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    if confirm {
        let second =
            rpassword::prompt_password("Confirm passphrase: ").context("reading passphrase")?;
        if first != second {
            anyhow::bail!("passphrases do not match");
        }
    }
    Ok(SecretString::from(first))
}

// ── Destination defaults ──────────────────────────────────────────────────────

fn default_encrypt_destination(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(".");
    name.push(CONTAINER_EXTENSION);
    PathBuf::from(name)
}

fn default_decrypt_destination(source: &Path) -> Result<PathBuf> {
    match source.extension() {
        Some(ext) if ext == CONTAINER_EXTENSION => Ok(source.with_extension("")),
        _ => anyhow::bail!(
            "cannot derive a destination from {}: no .{} extension (use --output)",
            source.display(),
            CONTAINER_EXTENSION
        ),
    }
}

// ── Encrypt / decrypt driver ──────────────────────────────────────────────────

fn cmd_run(spec: JobSpec, verb: &str) -> Result<()> {
    let total = std::fs::metadata(&spec.source).map(|m| m.len()).unwrap_or(0);
    let bar = make_progress_bar(total, verb);

    let bar_for_cb = bar.clone();
    let progress: ProgressFn = Box::new(move |p| {
        bar_for_cb.set_position(p.bytes_processed.min(p.bytes_total));
    });

    let report = run_job(&spec, &CancelFlag::new(), Some(&progress));
    bar.finish_and_clear();
    let report = report?;

    println!(
        "{} -> {} ({} bytes, {} chunks, {:.1}s)",
        report.source.display(),
        report.destination.display(),
        report.bytes_out,
        report.chunks,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .unwrap()
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `cbox inspect` ────────────────────────────────────────────────────────────

/// Header fields are readable without a passphrase, but without one they are
/// also unverified; the output says so.
fn cmd_inspect(container: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(container)
        .with_context(|| format!("reading container: {}", container.display()))?;
    if bytes.len() < PREFIX_SIZE {
        anyhow::bail!("not a CryptoBox container: {}", container.display());
    }
    let prefix: [u8; PREFIX_SIZE] = bytes[..PREFIX_SIZE].try_into().unwrap();
    let body_len = parse_prefix(&prefix)? as usize;
    if bytes.len() < PREFIX_SIZE + body_len + HEADER_TAG_SIZE {
        anyhow::bail!("container ends inside the header");
    }
    let body: serde_json::Value =
        serde_json::from_slice(&bytes[PREFIX_SIZE..PREFIX_SIZE + body_len])
            .context("header body is not valid JSON")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let version = u16::from_be_bytes([prefix[8], prefix[9]]);
        println!("container: {}", container.display());
        println!("version:   {version}");
        println!("suite:     {}", render_suite(&body["suite"]));
        println!(
            "kdf:       argon2id mem={} KiB, time={}, lanes={}",
            body["kdf"]["mem_cost_kib"], body["kdf"]["time_cost"], body["kdf"]["parallelism"]
        );
        println!("note:      header fields are unverified without a passphrase");
    }
    Ok(())
}

fn render_suite(value: &serde_json::Value) -> String {
    if let Some(single) = value.get("single").and_then(|v| v.as_str()) {
        return single.to_string();
    }
    if let Some(stages) = value.get("cascade").and_then(|v| v.as_array()) {
        let names: Vec<&str> = stages.iter().filter_map(|v| v.as_str()).collect();
        return names.join("+");
    }
    value.to_string()
}

// ── `cbox suites` ─────────────────────────────────────────────────────────────

fn cmd_suites() -> Result<()> {
    println!("single suites:");
    for id in CipherId::ALL {
        println!("  {id}");
    }
    println!("presets:");
    println!("  triple  ({})", CipherSuiteId::triple());
    println!();
    println!("cascades: join 2 or more suites with '+', e.g. aes-256-gcm+serpent-eax");
    Ok(())
}

// ── `cbox config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &CryptoBoxConfig, path: &Path) -> Result<()> {
    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} (not found, showing defaults)", path.display());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
