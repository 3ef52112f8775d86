use anyhow::Result;
use clap::{Parser, Subcommand};
use photodiag::cli::commands::{self, ContextArgs, PhotoArgs, ScopeArgs, SummaryArgs};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "photodiag")]
#[command(
  about = "Photodiag - Retrieval-Grounded Photo Diagnosis\nSuggest and validate technical descriptions for inspection photos"
)]
#[command(version)]
struct Cli {
  /// Diagnosis server URL
  #[arg(long, global = true, env = "PHOTODIAG_SERVER")]
  server: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Suggest a description for a photo
  Generate {
    /// Photo identifier recorded with the audit entry
    #[arg(long)]
    photo_id: Option<String>,
    #[command(flatten)]
    photo: PhotoArgs,
    #[command(flatten)]
    scope: ScopeArgs,
    #[command(flatten)]
    context: ContextArgs,
  },
  /// Record the final description of a photo
  Validate {
    /// Photo identifier
    #[arg(long)]
    photo_id: String,
    /// Final description text
    #[arg(long)]
    text: String,
    /// Feedback id of the AI suggestion the text started from
    #[arg(long)]
    prior: Option<Uuid>,
    /// The suggestion was edited before acceptance
    #[arg(long)]
    edited: bool,
    #[command(flatten)]
    scope: ScopeArgs,
    #[command(flatten)]
    summary: SummaryArgs,
    #[command(flatten)]
    context: ContextArgs,
  },
  /// Show the feedback history of a photo
  History {
    /// Photo identifier
    photo_id: String,
  },
  /// Show server health and store sizes
  Status,
}

async fn handle(server: Option<&str>, command: Command) -> Result<()> {
  match command {
    Command::Generate { photo_id, photo, scope, context } => {
      commands::generate(server, photo_id, photo, scope, context).await
    }
    Command::Validate { photo_id, text, prior, edited, scope, summary, context } => {
      commands::validate(server, photo_id, text, prior, edited, scope, summary, context).await
    }
    Command::History { photo_id } => commands::history(server, &photo_id).await,
    Command::Status => commands::status(server).await,
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  handle(cli.server.as_deref(), cli.command).await?;
  Ok(())
}
