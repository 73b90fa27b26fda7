//! wallet-recover CLI - Credential search and recovery for wallet blobs
//!
//! Searches candidate names and passphrases against an AES-CCM wallet blob,
//! decrypts a blob with a known credential, or describes a blob's parameters.

use clap::{CommandFactory, Parser, Subcommand};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

use wallet_recover::blobcrypt::CcmSuite;
use wallet_recover::candidates;
use wallet_recover::error::Result;
use wallet_recover::file_ops;
use wallet_recover::kdf;
use wallet_recover::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use wallet_recover::payload::ZERO_SEED;
use wallet_recover::search::{CandidateSearch, PayloadErrorPolicy, SearchOptions, SearchOutcome};

const EXIT_FAILURE: i32 = 1;
const EXIT_NO_MATCH: i32 = 3;

#[derive(Parser)]
#[command(name = "wallet-recover")]
#[command(version)]
#[command(about = "Recover credentials for encrypted wallet blobs.", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search candidate names and passphrases for the one that opens a wallet
    #[command(alias = "s")]
    Search {
        /// Path to the wallet blob, or - for stdin
        #[arg(short, long, value_name = "FILE")]
        wallet: PathBuf,

        /// Candidate name (repeatable)
        #[arg(short, long = "name", value_name = "NAME")]
        names: Vec<String>,

        /// File of whitespace-separated candidate names (repeatable)
        #[arg(long = "names-file", value_name = "FILE")]
        names_files: Vec<PathBuf>,

        /// Candidate passphrase (repeatable)
        #[arg(short, long = "passphrase", value_name = "PASSPHRASE")]
        passphrases: Vec<String>,

        /// File of whitespace-separated candidate passphrases (repeatable)
        #[arg(long = "passphrases-file", value_name = "FILE")]
        passphrases_files: Vec<PathBuf>,

        /// Spread attempts across all cores
        #[arg(long)]
        parallel: bool,

        /// Keep searching when a key authenticates but the wallet contents
        /// do not decode
        #[arg(long)]
        keep_going: bool,
    },

    /// Decrypt a wallet with a known name, prompting for the passphrase
    #[command(alias = "d")]
    Decrypt {
        /// Path to the wallet blob, or - for stdin
        #[arg(short, long, value_name = "FILE")]
        wallet: PathBuf,

        /// Wallet name
        #[arg(short, long)]
        name: String,

        /// Print the whole decrypted payload as JSON
        #[arg(long)]
        json: bool,

        /// Also write a re-sealed copy with the master seed replaced
        #[arg(long, value_name = "FILE")]
        stub: Option<PathBuf>,

        /// Seed to place in the stub
        #[arg(long, value_name = "SEED", default_value = ZERO_SEED)]
        stub_seed: String,
    },

    /// Show a wallet's envelope and cipher parameters
    #[command(alias = "i")]
    Inspect {
        /// Path to the wallet blob, or - for stdin
        #[arg(short, long, value_name = "FILE")]
        wallet: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    check_stdin_use(&cli);
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Search {
            wallet,
            names,
            names_files,
            passphrases,
            passphrases_files,
            parallel,
            keep_going,
        } => {
            let options = SearchOptions {
                parallel,
                on_payload_error: if keep_going {
                    PayloadErrorPolicy::Continue
                } else {
                    PayloadErrorPolicy::Abort
                },
            };
            let stdin_passphrase = cli.passphrase_stdin;
            gather_candidates(names, &names_files).and_then(|names| {
                gather_passphrases(passphrases, &passphrases_files, stdin_passphrase)
                    .and_then(|passphrases| run_search(&wallet, &names, &passphrases, options))
            })
        }
        Commands::Decrypt {
            wallet,
            name,
            json,
            stub,
            stub_seed,
        } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            run_decrypt(&wallet, &name, &mut *reader, json, stub.as_deref(), &stub_seed)
        }
        Commands::Inspect { wallet } => run_inspect(&wallet),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            report_error(&e);
            process::exit(EXIT_FAILURE);
        }
    }
}

/// Only one input can come from stdin.
fn check_stdin_use(cli: &Cli) {
    let wallet = match &cli.command {
        Commands::Search { wallet, .. } | Commands::Decrypt { wallet, .. } => wallet,
        Commands::Inspect { .. } => return,
    };
    if cli.passphrase_stdin && wallet.as_os_str() == "-" {
        Cli::command()
            .error(
                clap::error::ErrorKind::ArgumentConflict,
                "--wallet - cannot be combined with --passphrase-stdin, both read stdin",
            )
            .exit();
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "wallet_recover=info",
        1 => "wallet_recover=debug",
        _ => "wallet_recover=trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Unable to set global default subscriber");
    }
}

fn gather_candidates(mut inline: Vec<String>, files: &[PathBuf]) -> Result<Vec<String>> {
    for file in files {
        inline.extend(candidates::read_file(file)?);
    }
    Ok(inline)
}

fn gather_passphrases(
    inline: Vec<String>,
    files: &[PathBuf],
    from_stdin: bool,
) -> Result<Vec<String>> {
    let mut passphrases = gather_candidates(inline, files)?;
    if from_stdin {
        let mut reader = ReaderPassphraseReader::new(Box::new(std::io::stdin()));
        passphrases.push(reader.read_passphrase()?.trim().to_string());
    }
    Ok(passphrases)
}

fn run_search(
    wallet: &Path,
    names: &[String],
    passphrases: &[String],
    options: SearchOptions,
) -> Result<i32> {
    let envelope = file_ops::load_envelope(wallet)?;
    let search = CandidateSearch::new(&envelope, names, passphrases, options)?;

    match search.run()? {
        SearchOutcome::Found(recovery) => {
            let credential = &recovery.credential;
            println!("name: {}", credential.name);
            println!("passphrase: {}", credential.passphrase);
            println!("scheme: {}", credential.scheme);
            println!("attempt: {}", recovery.attempt);
            println!("master_seed: {}", recovery.payload.master_seed);
            println!("account_id: {}", recovery.payload.account_id);
            Ok(0)
        }
        SearchOutcome::Exhausted { attempts } => {
            eprintln!("No match found after {} attempts", attempts);
            Ok(EXIT_NO_MATCH)
        }
    }
}

fn run_decrypt(
    wallet: &Path,
    name: &str,
    passphrase_reader: &mut dyn PassphraseReader,
    json: bool,
    stub: Option<&Path>,
    stub_seed: &str,
) -> Result<i32> {
    let envelope = file_ops::load_envelope(wallet)?;
    let passphrase = passphrase_reader.read_passphrase()?;
    let unlocked = file_ops::decrypt_wallet(&envelope, name, &passphrase)?;

    if json {
        println!("{}", unlocked.payload.to_pretty_json()?);
    } else {
        println!("blob_id: {}", kdf::blob_id(name.trim(), passphrase.trim()));
        println!("scheme: {}", unlocked.scheme);
        println!("master_seed: {}", unlocked.payload.master_seed);
        println!("account_id: {}", unlocked.payload.account_id);
        for contact in &unlocked.payload.contacts {
            println!("contact: {} {}", contact.name, contact.address);
        }
    }

    if let Some(stub_path) = stub {
        file_ops::write_stub(&envelope, &unlocked, stub_seed, stub_path)?;
        eprintln!("Wrote stub wallet to {}", stub_path.display());
    }
    Ok(0)
}

fn run_inspect(wallet: &Path) -> Result<i32> {
    let envelope = file_ops::load_envelope(wallet)?;
    println!("{}", envelope.to_pretty_json()?);

    let suite = CcmSuite::for_envelope(&envelope)?;
    println!(
        "cipher: {}-{}, {}-bit key, {}-bit tag",
        envelope.cipher,
        envelope.mode,
        suite.key_len() * 8,
        suite.tag_len() * 8
    );
    println!(
        "nonce: {} of {} IV bytes",
        suite.nonce().len(),
        envelope.iv.len()
    );
    println!("iterations: {}", envelope.iterations);
    Ok(0)
}

fn report_error(err: &(dyn StdError + 'static)) {
    eprintln!("Error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader)
    }
}
