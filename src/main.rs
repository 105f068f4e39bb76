use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
mod secret;
use facegate::config::THRESHOLD_ENV;
use facegate::{
    DescriptorSubmission, Facegate, FeatureVector, LoginOutcome, MatchConfig, SignupRequest,
    StorageKey, Storage, default_storage, transport,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage(),
    }
}

/// Read a captured descriptor (JSON array of 128 numbers).
fn read_descriptor(path: &Path) -> Result<FeatureVector> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read descriptor file {}", path.display()))?;
    FeatureVector::from_json(&data).context("invalid descriptor file")
}

/// Run the client half of the transport: fetch a key, encrypt, build the body.
fn submit(fg: &Facegate, path: &Path) -> Result<DescriptorSubmission> {
    let vector = read_descriptor(path)?;
    let issued = fg.issue_key()?;
    Ok(transport::seal(&vector, &issued)?)
}

#[derive(Debug, Parser)]
#[command(name = "facegate")]
#[command(
    version,
    about = "Encrypted face-descriptor sign-in for employee accounts."
)]
struct Cli {
    /// Path to the identity registry file
    #[arg(long, global = true, value_name = "PATH", env = "FACEGATE_PATH")]
    store: Option<PathBuf>,

    /// Maximum face distance accepted as a match
    #[arg(long, global = true, env = THRESHOLD_ENV)]
    threshold: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates an empty identity registry
    Init,

    /// Prints a fresh random storage key
    Keygen,

    /// Registers a new identity with a face descriptor file
    #[command(arg_required_else_help = true)]
    Enroll {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Mark the identity as staff (no face login)
        #[arg(long, default_value_t = false)]
        staff: bool,
        descriptor: PathBuf,
    },

    /// Identifies who a face descriptor belongs to
    #[command(arg_required_else_help = true)]
    Login { descriptor: PathBuf },

    /// Confirms a face descriptor belongs to the given identity
    #[command(arg_required_else_help = true)]
    Confirm {
        #[arg(long)]
        user_id: u64,
        descriptor: PathBuf,
    },

    /// Lists registered identities
    List,

    /// Encrypts descriptors still stored as plaintext
    Migrate,

    /// Shows information about the registry
    Info,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FACEGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let args = Cli::parse();
    let config = match args.threshold.as_deref() {
        Some(raw) if !raw.trim().is_empty() => MatchConfig::parse(raw)?,
        _ => MatchConfig::default(),
    };

    match args.command {
        Commands::Keygen => {
            println!("{}", StorageKey::generate()?.as_key().to_base64());
        }
        Commands::Init => {
            let storage = resolve_storage(args.store)?;
            let key = secret::read_storage_key()?;
            Facegate::init_with_storage(storage, key, config)?;
            println!("registry initialized");
        }
        Commands::Enroll {
            email,
            first_name,
            phone,
            staff,
            descriptor,
        } => {
            let storage = resolve_storage(args.store)?;
            let key = secret::read_storage_key()?;
            let mut fg = Facegate::open_with_storage(storage, key, config)?;
            let submission = submit(&fg, &descriptor)?;
            let id = fg.register(SignupRequest {
                email: email.clone(),
                first_name,
                mobile_phone: phone,
                is_staff: staff,
                submission,
            })?;
            fg.save()?;
            println!("registered '{email}' as identity {id}");
        }
        Commands::Login { descriptor } => {
            let storage = resolve_storage(args.store)?;
            let key = secret::read_storage_key()?;
            let fg = Facegate::open_with_storage(storage, key, config)?;
            let submission = submit(&fg, &descriptor)?;
            match fg.login(&submission)? {
                LoginOutcome::Authenticated(summary) => {
                    println!("signed in as '{}' (identity {})", summary.email, summary.user_id);
                }
                LoginOutcome::StaffRedirect => {
                    bail!("administrators sign in through the admin login")
                }
                LoginOutcome::NotRecognized => bail!("face not recognized"),
            }
        }
        Commands::Confirm {
            user_id,
            descriptor,
        } => {
            let storage = resolve_storage(args.store)?;
            let key = secret::read_storage_key()?;
            let fg = Facegate::open_with_storage(storage, key, config)?;
            let submission = submit(&fg, &descriptor)?;
            fg.confirm(user_id, &submission)?;
            println!("face confirmed for identity {user_id}");
        }
        Commands::List => {
            let storage = resolve_storage(args.store)?;
            let key = secret::read_storage_key()?;
            let fg = Facegate::open_with_storage(storage, key, config)?;
            let identities = fg.identities();

            if identities.is_empty() {
                println!("No identities registered.");
                return Ok(());
            }

            let email_width = identities
                .iter()
                .map(|i| i.email().len())
                .chain(std::iter::once("Email".len()))
                .max()
                .unwrap_or(5);

            println!(
                "{:>4}  {:<email_width$}  {:<5}  {:<4}  {}",
                "ID", "Email", "Staff", "Face", "Registered"
            );
            println!(
                "{:->4}  {:-<email_width$}  {:-<5}  {:-<4}  {:-<10}",
                "", "", "", "", ""
            );

            for i in identities {
                println!(
                    "{:>4}  {:<email_width$}  {:<5}  {:<4}  {}",
                    i.id(),
                    i.email(),
                    if i.is_staff() { "yes" } else { "no" },
                    if i.face_descriptor().is_some() { "yes" } else { "no" },
                    i.registered_at(),
                );
            }
        }
        Commands::Migrate => {
            let storage = resolve_storage(args.store)?;
            let key = secret::read_storage_key()?;
            let mut fg = Facegate::open_with_storage(storage, key, config)?;
            let report = fg.migrate_legacy()?;
            fg.save()?;
            println!(
                "migrated {}, already encrypted {}, unreadable {}",
                report.migrated, report.already_encrypted, report.unreadable
            );
        }
        Commands::Info => {
            let storage = resolve_storage(args.store)?;
            let key = secret::read_storage_key()?;
            let fg = Facegate::open_with_storage(storage, key, config)?;
            println!("{}", fg.info());
        }
    }

    Ok(())
}
