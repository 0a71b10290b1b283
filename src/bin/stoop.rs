//! Stoop CLI - password-based layered encryption
//!
//! Command-line interface for encrypting and decrypting files with the
//! layered Argon2id/AES-GCM/ChaCha20-Poly1305/AES-CBC pipeline, and short
//! texts with the simple engine.

use bson::Document;
use clap::{Parser, Subcommand};
use std::error::Error as _;
use std::path::PathBuf;
use std::process;

use stoop::file_ops;
use stoop::passphrase::{PasswordReader, StreamPasswordReader, TerminalPasswordReader};
use stoop::worker::Job;
use stoop::{Engine, EngineConfig, ErrorCategory, Result, StoopError};

#[derive(Parser)]
#[command(name = "stoop")]
#[command(version)]
#[command(about = "Password-based layered file and text encryption.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Log filter used when RUST_LOG is not set (e.g. "info", "stoop=debug")
    #[arg(long, global = true, value_name = "FILTER", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the package to [default: <input>.stoop]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Attach a key=value entry to the package's option bag (repeatable)
        #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },

    /// Decrypt a file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the package to be decrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the plaintext to [default: <input> without .stoop, plus _decrypted]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Update an encrypted file with new content, while validating
    /// that the password is not accidentally changed.
    #[command(alias = "u")]
    Update {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the existing stoop package to replace
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Encrypt a text and print it as base64
    EncryptText {
        /// Path to the file holding the text [default: read from stdin]
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Decrypt base64 text produced by encrypt-text
    DecryptText {
        /// Base64 package to decrypt
        encoded: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", chain(&e));
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let engine = Engine::init(EngineConfig::default())?;
    let stdin = cli.passphrase_stdin;

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            options,
        } => {
            let mut reader = password_reader(stdin, true);
            let options: Document = options
                .into_iter()
                .map(|(k, v)| (k, bson::Bson::String(v)))
                .collect();
            Job::spawn("encrypt", move |cancel| {
                file_ops::encrypt_file(&engine, &input, output.as_deref(), &mut *reader, options, cancel)
            })?
            .join()
            .map(|_| ())
        }
        Commands::Decrypt { input, output } => {
            let mut reader = password_reader(stdin, false);
            Job::spawn("decrypt", move |cancel| {
                file_ops::decrypt_file(&engine, &input, output.as_deref(), &mut *reader, cancel)
            })?
            .join()
            .map(|_| ())
        }
        Commands::Update { input, output } => {
            let mut reader = password_reader(stdin, false);
            Job::spawn("update", move |cancel| {
                file_ops::update_file(&engine, &input, &output, &mut *reader, cancel)
            })?
            .join()
            .map(|_| ())
        }
        Commands::EncryptText { input } => {
            if input.is_none() && stdin {
                return Err(StoopError::new(
                    ErrorCategory::User,
                    "encrypt-text needs --input when the password is read from stdin",
                ));
            }
            let text = file_ops::read_text(input.as_deref(), &mut std::io::stdin())?;
            let password = password_reader(stdin, true).read_password()?;
            let encoded = Job::spawn("encrypt-text", move |cancel| {
                cancel.checkpoint()?;
                engine.encrypt_text(&text, &password)
            })?
            .join()?;
            println!("{encoded}");
            Ok(())
        }
        Commands::DecryptText { encoded } => {
            let password = password_reader(stdin, false).read_password()?;
            let text = Job::spawn("decrypt-text", move |cancel| {
                cancel.checkpoint()?;
                engine.decrypt_text(&encoded, &password)
            })?
            .join()?;
            println!("{text}");
            Ok(())
        }
    }
}

fn password_reader(use_stdin: bool, confirm: bool) -> Box<dyn PasswordReader + Send> {
    if use_stdin {
        Box::new(StreamPasswordReader::new(Box::new(std::io::stdin())))
    } else if confirm {
        Box::new(TerminalPasswordReader::confirming())
    } else {
        Box::new(TerminalPasswordReader::new())
    }
}

fn parse_option(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Logs go to stderr so stdout stays clean for encrypt-text/decrypt-text.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// "outer: inner: innermost", skipping repeats of a message already shown.
fn chain(err: &StoopError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        let msg = e.to_string();
        if !out.contains(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        source = e.source();
    }
    out
}
