//! ink-creds - Manage the author's GitHub App private key
//!
//! A key is only stored after it has been exchanged for a token once.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use libinkpost::credentials::CREDENTIAL_STORAGE_KEY;
use libinkpost::logging;
use libinkpost::notifications::RendererHandle;
use libinkpost::{AuthSnapshot, InkpostError, Outcome, Session};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "ink-creds")]
#[command(version, about = "Manage the private key inkpost publishes with", long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Import a GitHub App private key (verified before it is stored)
    ink-creds import ~/Downloads/my-blog.2024-05-01.private-key.pem

    # Show whether the stored key still authenticates
    ink-creds status
    ink-creds status --format json | jq .authenticated

    # Print a fresh installation token for scripts
    GH_TOKEN=$(ink-creds token) gh api repos/{owner}/{repo}

EXIT CODES:
    0 - Success
    1 - Error (network, storage, configuration)
    2 - Key rejected or no key stored
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a PEM private key and store it
    Import {
        /// Path to the PEM file
        path: PathBuf,
    },

    /// Show the stored key and whether it authenticates
    Status {
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print a freshly issued token to stdout
    Token,

    /// Remove the stored key and its derived state
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Follow the auth state, including changes made by other processes
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// An error the notification renderer has already shown
#[derive(Debug)]
struct Reported(InkpostError);

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for Reported {}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_default(cli.verbose);

    if let Err(e) = run_command(cli.command).await {
        let code = if let Some(Reported(inner)) = e.downcast_ref::<Reported>() {
            inner.exit_code()
        } else if let Some(inner) = e.downcast_ref::<InkpostError>() {
            eprintln!("Error: {}", inner);
            inner.exit_code()
        } else {
            eprintln!("Error: {:#}", e);
            1
        };
        std::process::exit(code);
    }
}

async fn run_command(command: Commands) -> Result<()> {
    let session = Session::new()?;

    match command {
        Commands::Import { path } => import_key(&session, path).await,
        Commands::Status { format } => show_status(&session, format).await,
        Commands::Token => print_token(&session).await,
        Commands::Clear { force } => clear_key(&session, force),
        Commands::Watch => watch(&session).await,
    }
}

async fn import_key(session: &Session, path: PathBuf) -> Result<()> {
    let renderer = RendererHandle::spawn(session.notifier());
    let outcome = session.orchestrator().import_key(&path).await;
    renderer.shutdown().await;

    match outcome {
        Outcome::Success { .. } => Ok(()),
        Outcome::Failure { error } => Err(Reported(error.into()).into()),
    }
}

#[derive(Serialize)]
struct Status {
    backend: String,
    key_path: Option<PathBuf>,
    key_stored: bool,
    authenticated: bool,
    last_token: Option<String>,
}

async fn show_status(session: &Session, format: Format) -> Result<()> {
    let auth = session.auth();
    auth.refresh().await;
    let AuthSnapshot {
        is_authenticated,
        credential,
    } = auth.snapshot();

    let cache = auth.cache();
    let last_token = cache
        .load_token()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to read last token: {}", e);
            None
        })
        .map(|token| token.fingerprint());

    let status = Status {
        backend: cache.backend_name().to_string(),
        key_path: cache.slot_path(CREDENTIAL_STORAGE_KEY),
        key_stored: credential.is_some(),
        authenticated: is_authenticated,
        last_token,
    };

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Format::Text => {
            let location = status
                .key_path
                .as_ref()
                .map(|p| format!(" ({})", p.display()))
                .unwrap_or_default();
            println!("Storage:       {}{}", status.backend, location);
            println!(
                "Key:           {}",
                if status.key_stored { "stored" } else { "none" }
            );
            println!(
                "Authenticated: {}",
                if status.authenticated { "yes" } else { "no" }
            );
            println!(
                "Last token:    {}",
                status.last_token.as_deref().unwrap_or("none")
            );
            if !status.key_stored {
                println!("\nRun 'ink-creds import <pem-file>' to add a key.");
            } else if !status.authenticated {
                println!("\nThe stored key no longer authenticates. Import a new one.");
            }
        }
    }

    Ok(())
}

async fn print_token(session: &Session) -> Result<()> {
    let token = session.auth().get_token(None).await?;
    tracing::debug!("Issued token {}", token.fingerprint());
    println!("{}", token.expose());
    Ok(())
}

fn clear_key(session: &Session, force: bool) -> Result<()> {
    let cache = session.auth().cache();
    // A key that no longer decrypts still has to be removable
    let stored = match cache.slot_path(CREDENTIAL_STORAGE_KEY) {
        Some(path) => path.exists(),
        None => !matches!(cache.load(), Ok(None)),
    };
    if !stored {
        println!("No stored key");
        return Ok(());
    }

    if !force && atty::is(atty::Stream::Stdin) {
        use std::io::{self, Write};
        print!("Remove the stored private key? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled");
            return Ok(());
        }
    }

    session.auth().clear_auth()?;
    println!("✓ Removed stored key");
    Ok(())
}

fn describe(snapshot: &AuthSnapshot) -> &'static str {
    match (snapshot.is_authenticated, snapshot.credential.is_some()) {
        (true, _) => "authenticated",
        (false, true) => "key stored, not authenticated",
        (false, false) => "no key",
    }
}

async fn watch(session: &Session) -> Result<()> {
    let auth = session.auth();
    let _watcher = auth
        .watch_storage()
        .context("Failed to watch credential storage")?;
    let sync = auth.spawn_sync();
    let mut snapshots = auth.subscribe();

    auth.refresh().await;
    println!("{}", describe(&snapshots.borrow_and_update()));

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", describe(&snapshots.borrow_and_update()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    sync.abort();
    Ok(())
}
