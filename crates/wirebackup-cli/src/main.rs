#![forbid(unsafe_code)]

mod config;
mod exit_code;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wirebackup_core::{
    DecryptError, DecryptOptions, HeaderError, IdentityCheck, Password, StreamError, decrypt_file,
};

use crate::config::{Config, Defaults};

/// Decrypt an encrypted messenger backup
#[derive(Parser)]
#[command(name = "wirebackup")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Decrypt a backup
    wirebackup backup.bin backup.txt 'my password'

    # Also check that the backup belongs to an account
    wirebackup backup.bin backup.txt 'my password' <UUID> --identity-check enforce

    # Keep the password out of the shell history
    WIREBACKUP_PASSWORD='my password' wirebackup backup.bin backup.txt
")]
struct Cli {
    /// Encrypted backup file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the decrypted data (created or truncated)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Backup password
    #[arg(value_name = "PASSWORD", env = "WIREBACKUP_PASSWORD", hide_env_values = true)]
    password: String,

    /// Account identifier the backup was made for
    #[arg(value_name = "UUID")]
    uuid: Option<String>,

    /// How to treat the identity hash stored in the backup header:
    /// skip, warn (log a mismatch and continue) or enforce
    #[arg(long, value_name = "MODE")]
    identity_check: Option<IdentityCheck>,

    /// Reject backups with an unknown platform tag or version
    #[arg(long)]
    strict: bool,

    /// Plaintext bytes per chunk
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress messages and logging
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load()?;

    // Set up tracing based on verbosity (skip if quiet)
    if !cli.quiet {
        let verbose = if cli.verbose > 0 {
            cli.verbose
        } else {
            config.defaults.verbosity.unwrap_or(0)
        };
        setup_tracing(verbose);
    }

    let options = build_options(cli, &config.defaults);
    let mut password = Password::new(cli.password.as_str());
    if let Some(ref uuid) = cli.uuid {
        password = password.with_uuid(uuid.as_str());
    }

    if !cli.quiet {
        println!("Start decrypting");
    }

    let summary = decrypt_file(&cli.input, &cli.output, &password, &options)
        .with_context(|| format!("Failed to decrypt {}", cli.input.display()))?;

    if !cli.quiet {
        println!("Decrypting successful ({} bytes)", summary.bytes_written);
    }
    Ok(())
}

/// Merge command-line flags over the config file defaults.
fn build_options(cli: &Cli, defaults: &Defaults) -> DecryptOptions {
    let mut options = DecryptOptions::default();

    if let Some(check) = cli.identity_check.or(defaults.identity_check) {
        options = options.with_identity_check(check);
    }

    options = options.with_strict_format(cli.strict || defaults.strict_format.unwrap_or(false));

    if let Some(chunk_size) = cli.chunk_size.or(defaults.chunk_size) {
        options = options.with_chunk_size(chunk_size);
    }

    options
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(decrypt_err) = cause.downcast_ref::<DecryptError>() {
            match decrypt_err {
                DecryptError::Stream(StreamError::AuthenticationFailure { .. })
                | DecryptError::IdentityMismatch { .. } => return exit_code::AUTH_FAILED,
                DecryptError::Header(HeaderError::TooShort { .. })
                | DecryptError::UnsupportedFormat { .. }
                | DecryptError::Stream(
                    StreamError::TruncatedInput { .. }
                    | StreamError::MissingFinalTag { .. }
                    | StreamError::UnknownTag { .. }
                    | StreamError::InitFailure { .. },
                ) => return exit_code::BACKUP_INVALID,
                DecryptError::InvalidOptions(_) => return exit_code::USAGE_ERROR,
                DecryptError::Io { source, .. } => match source.kind() {
                    io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                    io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                    _ => {}
                },
                _ => {}
            }
        }

        // Generic I/O errors
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                _ => {}
            }
        }
    }

    exit_code::GENERAL_ERROR
}
