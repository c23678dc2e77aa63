//! ink-post - Publish, delete and inspect posts on a GitHub-hosted site

use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use libinkpost::logging;
use libinkpost::notifications::RendererHandle;
use libinkpost::publish::frontmatter;
use libinkpost::{Cover, DraftPost, ImageAsset, InkpostError, Outcome, Session};

#[derive(Parser)]
#[command(name = "ink-post")]
#[command(version, about = "Publish posts to a GitHub-hosted static site", long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Publish a new post, body from a file
    ink-post publish --title "Hello" --slug hello --body-file hello.md

    # Body from stdin, with a cover and inline images
    cat draft.md | ink-post publish --title "Trip" --slug trip \
        --cover photos/cover.jpg --image photos/1.png --image photos/2.png

    # Edit an existing post, renaming it
    ink-post publish --edit hello --slug hello-world

    # Remove a post
    ink-post delete hello-world

EXIT CODES:
    0 - Success
    1 - Error (network, remote rejection, configuration)
    2 - Authentication error (no key stored, key rejected)
    3 - Invalid input (missing title or slug)
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
    /// Create a post, or update one with --edit
    Publish(PublishArgs),

    /// Delete a post
    Delete {
        /// Slug of the post to delete
        slug: String,
    },

    /// Print a stored post
    Show {
        slug: String,

        #[arg(short, long, value_enum, default_value_t = ShowFormat::Markdown)]
        format: ShowFormat,
    },
}

#[derive(Args)]
struct PublishArgs {
    /// Post title
    #[arg(short, long)]
    title: Option<String>,

    /// URL path of the post
    #[arg(short, long)]
    slug: Option<String>,

    /// Markdown body ('-' for stdin; stdin is also used when piped)
    #[arg(short, long, value_name = "FILE")]
    body_file: Option<PathBuf>,

    /// Publication date (YYYY-MM-DD), today by default
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Local cover image to upload
    #[arg(long, value_name = "FILE", conflicts_with = "cover_url")]
    cover: Option<PathBuf>,

    /// Cover image already hosted elsewhere
    #[arg(long, value_name = "URL")]
    cover_url: Option<String>,

    /// Image to upload next to the post (repeatable)
    #[arg(long = "image", value_name = "FILE")]
    images: Vec<PathBuf>,

    /// Load the post stored under this slug and update it
    #[arg(long, value_name = "ORIGINAL_SLUG")]
    edit: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowFormat {
    Markdown,
    Json,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {}", e))
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

    if let Err(e) = run(cli.command).await {
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

async fn run(command: Commands) -> Result<()> {
    let session = Session::new()?;
    let renderer = RendererHandle::spawn(session.notifier());

    let result = match command {
        Commands::Publish(args) => publish(&session, args).await,
        Commands::Delete { slug } => delete(&session, slug).await,
        Commands::Show { slug, format } => show(&session, &slug, format).await,
    };

    renderer.shutdown().await;
    result
}

fn finish(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Success { .. } => Ok(()),
        Outcome::Failure { error } => Err(Reported(error.into()).into()),
    }
}

fn read_body(path: Option<&PathBuf>) -> Result<Option<String>> {
    match path {
        Some(path) if path.as_os_str() == "-" => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read body from stdin")?;
            Ok(Some(body))
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .map(Some),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read body from stdin")?;
            Ok(Some(body))
        }
        None => Ok(None),
    }
}

async fn publish(session: &Session, args: PublishArgs) -> Result<()> {
    let body = read_body(args.body_file.as_ref())?;

    let mut draft = match &args.edit {
        Some(original) => session
            .orchestrator()
            .load_for_edit(original)
            .await
            .map_err(|e| Reported(e.into()))?,
        None => DraftPost::default(),
    };

    if let Some(title) = args.title {
        draft.form.title = title;
    }
    if let Some(slug) = args.slug {
        draft.form.slug = slug;
    }
    if let Some(body) = body {
        draft.form.body = body;
    }
    if args.date.is_some() {
        draft.form.date = args.date;
    }
    if let Some(path) = args.cover {
        draft.cover = Some(Cover::File { path });
    } else if let Some(url) = args.cover_url {
        draft.cover = Some(Cover::Url { url });
    }
    draft.images.extend(args.images.into_iter().map(ImageAsset::new));

    tracing::debug!(
        "Publishing '{}' ({:?}, {} images)",
        draft.form.slug,
        draft.mode,
        draft.images.len()
    );
    finish(session.orchestrator().publish(&draft).await)
}

async fn delete(session: &Session, slug: String) -> Result<()> {
    let draft = DraftPost::new("", slug, "");
    finish(session.orchestrator().delete(&draft).await)
}

async fn show(session: &Session, slug: &str, format: ShowFormat) -> Result<()> {
    let draft = session
        .orchestrator()
        .load_for_edit(slug)
        .await
        .map_err(|e| Reported(e.into()))?;

    match format {
        ShowFormat::Json => println!("{}", serde_json::to_string_pretty(&draft)?),
        ShowFormat::Markdown => {
            let cover = match &draft.cover {
                Some(Cover::Url { url }) => Some(url.as_str()),
                _ => None,
            };
            let date = draft
                .form
                .date
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            print!("{}", frontmatter::render(&draft.form, date, cover)?);
        }
    }
    Ok(())
}
