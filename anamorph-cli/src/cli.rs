use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::{generate_to, Shell};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use anamorph::{KeySet, PrivateKey, PublicKey, SearchPolicy, SharedScalar, Strategy, Token};

fn main() -> ExitCode {
    let opts = Opts::parse();
    init_tracing(opts.verbose);

    let format = if opts.json { Format::Json } else { Format::Text };
    let result = match opts.cmd {
        Cmd::Keygen(cmd) => cmd.run(format),
        Cmd::Encrypt(cmd) => cmd.run(format),
        Cmd::Decrypt(cmd) => cmd.run(format),
        Cmd::Recover(cmd) => cmd.run(format),
        Cmd::Complete(cmd) => cmd.run(format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match format {
                Format::Json => println!("{}", error_json(&e)),
                Format::Text => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opts {
    #[clap(subcommand)]
    cmd: Cmd,

    /// Write results and errors as JSON objects.
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

trait Runnable {
    fn run(self, format: Format) -> Result<()>;
}

#[derive(Debug, Subcommand)]
enum Cmd {
    #[command(display_order(1))]
    Keygen(KeygenArgs),
    #[command(display_order(2))]
    Encrypt(EncryptArgs),
    #[command(display_order(3))]
    Decrypt(DecryptArgs),
    #[command(display_order(4))]
    Recover(RecoverArgs),
    #[command(display_order(5))]
    Complete(CompleteArgs),
}

/// Generate a dictator key pair and a shared scalar.
#[derive(Debug, Parser)]
struct KeygenArgs {
    /// The directory to write dictator.json, dictator.pub.json, and shared.json to.
    #[arg(value_hint = ValueHint::DirPath)]
    output: PathBuf,
}

impl Runnable for KeygenArgs {
    fn run(self, format: Format) -> Result<()> {
        let keys = KeySet::generate(rand::thread_rng());
        fs::create_dir_all(&self.output)
            .with_context(|| format!("creating {}", self.output.display()))?;

        let dictator = self.output.join("dictator.json");
        let public_key = self.output.join("dictator.pub.json");
        let shared = self.output.join("shared.json");
        write_json(create_secret(&dictator)?, &serde_json::to_value(&keys.dictator)?)?;
        write_json(create(&public_key)?, &serde_json::to_value(keys.dictator.public_key())?)?;
        write_json(create_secret(&shared)?, &serde_json::to_value(keys.shared)?)?;

        if format == Format::Json {
            println!(
                "{}",
                json!({
                    "dictator": dictator,
                    "public_key": public_key,
                    "shared": shared,
                })
            );
        }
        Ok(())
    }
}

/// Encrypt a cover message for the dictator, carrying a covert value.
#[derive(Debug, Parser)]
struct EncryptArgs {
    /// The path to the dictator's public key.
    #[arg(long, value_hint = ValueHint::FilePath)]
    recipient: PathBuf,

    /// The path to the shared scalar.
    #[arg(long, value_hint = ValueHint::FilePath)]
    shared: PathBuf,

    /// The covert value to embed.
    #[arg(long)]
    covert: u64,

    /// The path to the plaintext file or '-' for stdin.
    #[arg(value_hint = ValueHint::FilePath)]
    plaintext: PathBuf,

    /// The path to the token file or '-' for stdout.
    #[arg(value_hint = ValueHint::FilePath, default_value = "-")]
    output: PathBuf,
}

impl Runnable for EncryptArgs {
    fn run(self, format: Format) -> Result<()> {
        let recipient = read_key::<PublicKey>(&self.recipient)?;
        let shared = read_key::<SharedScalar>(&self.shared)?;
        let mut plaintext = Vec::new();
        open_input(&self.plaintext)?.read_to_end(&mut plaintext)?;

        let token = recipient.encrypt(rand::thread_rng(), &shared, self.covert, &plaintext)?;
        let mut output = open_output(&self.output)?;
        match format {
            Format::Json => writeln!(output, "{}", json!({ "token": token.to_string() }))?,
            Format::Text => writeln!(output, "{token}")?,
        }
        Ok(())
    }
}

/// Decrypt a token's cover message with the dictator's private key.
#[derive(Debug, Parser)]
struct DecryptArgs {
    /// The path to the dictator's private key.
    #[arg(long, value_hint = ValueHint::FilePath)]
    private_key: PathBuf,

    /// The path to the token file or '-' for stdin.
    #[arg(value_hint = ValueHint::FilePath)]
    token: PathBuf,

    /// The path to the plaintext file or '-' for stdout.
    #[arg(value_hint = ValueHint::FilePath, default_value = "-")]
    output: PathBuf,
}

impl Runnable for DecryptArgs {
    fn run(self, format: Format) -> Result<()> {
        let private_key = read_key::<PrivateKey>(&self.private_key)?;
        let token = read_token(&self.token)?;
        let plaintext = private_key.decrypt(&token)?;

        let mut output = open_output(&self.output)?;
        match format {
            Format::Json => {
                let plaintext = String::from_utf8(plaintext).context("plaintext is not UTF-8")?;
                writeln!(output, "{}", json!({ "plaintext": plaintext }))?;
            }
            Format::Text => output.write_all(&plaintext)?,
        }
        Ok(())
    }
}

/// Recover a token's covert value with the shared scalar.
#[derive(Debug, Parser)]
struct RecoverArgs {
    /// The path to the shared scalar.
    #[arg(long, value_hint = ValueHint::FilePath)]
    shared: PathBuf,

    /// The path to the token file or '-' for stdin.
    #[arg(value_hint = ValueHint::FilePath)]
    token: PathBuf,

    /// The largest covert value to search for.
    #[arg(long, env = "ANAMORPH_MAX_SEARCH")]
    max: Option<u64>,

    /// The search algorithm.
    #[arg(long, value_enum, env = "ANAMORPH_STRATEGY", default_value = "linear")]
    strategy: StrategyArg,

    /// Give up after the given number of milliseconds.
    #[arg(long, env = "ANAMORPH_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// The number of threads used by the parallel strategy.
    #[arg(long, env = "ANAMORPH_THREADS")]
    threads: Option<usize>,
}

impl Runnable for RecoverArgs {
    fn run(self, format: Format) -> Result<()> {
        if let Some(threads) = self.threads {
            rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
        }

        let shared = read_key::<SharedScalar>(&self.shared)?;
        let token = read_token(&self.token)?;

        let mut policy = SearchPolicy::new().with_strategy(self.strategy.into());
        policy.max = self.max;
        policy.timeout = self.timeout_ms.map(Duration::from_millis);
        debug!(?policy, "recovering covert value");

        let start = Instant::now();
        let covert = shared.recover_with(&token, &policy)?;
        let elapsed = start.elapsed();

        match format {
            Format::Json => println!(
                "{}",
                json!({
                    "covert": covert,
                    "fingerprint": hex::encode(token.fingerprint()?),
                    "elapsed_ms": elapsed.as_millis(),
                })
            ),
            Format::Text => println!("{covert}"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Linear,
    Parallel,
    BabySteps,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Linear => Strategy::Linear,
            StrategyArg::Parallel => Strategy::Parallel,
            StrategyArg::BabySteps => Strategy::BabySteps,
        }
    }
}

/// Generate shell completion scripts.
#[derive(Debug, Parser)]
#[command(hide(true))]
struct CompleteArgs {
    /// The type of shell completion script to generate: bash, elvish, fish, powershell, or zsh.
    #[arg()]
    shell: Shell,

    /// Output directory for shell completion scripts.
    #[arg(value_hint = ValueHint::DirPath)]
    output: PathBuf,
}

impl Runnable for CompleteArgs {
    fn run(self, _format: Format) -> Result<()> {
        let mut app = Opts::command();
        generate_to(self.shell, &mut app, "anamorph", &self.output)?;
        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "anamorph=debug" } else { "anamorph=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn error_json(e: &anyhow::Error) -> serde_json::Value {
    let kind = e
        .chain()
        .find_map(|cause| cause.downcast_ref::<anamorph::Error>().map(anamorph::Error::kind))
        .or_else(|| e.chain().any(|cause| cause.is::<io::Error>()).then_some("io_error"))
        .unwrap_or("error");
    json!({ "error": kind, "details": format!("{e:#}") })
}

fn read_key<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(f)
        .map_err(anamorph::Error::from)
        .with_context(|| format!("reading {}", path.display()))
}

fn read_token(path: &Path) -> Result<Token> {
    let mut s = String::new();
    open_input(path)?.read_to_string(&mut s)?;
    Ok(s.parse()?)
}

fn write_json(mut f: File, value: &serde_json::Value) -> Result<()> {
    serde_json::to_writer_pretty(&mut f, value)?;
    writeln!(f)?;
    Ok(())
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("creating {}", path.display()))
}

/// Creates a file only its owner can read or write.
#[cfg(unix)]
fn create_secret(path: &Path) -> Result<File> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let f = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    // The mode only applies to new files.
    f.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(f)
}

#[cfg(not(unix))]
fn create_secret(path: &Path) -> Result<File> {
    create(path)
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(File::open(path).with_context(|| format!("opening {}", path.display()))?))
    }
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(io::stdout().lock()))
    } else {
        Ok(Box::new(create(path)?))
    }
}
