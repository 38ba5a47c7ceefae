use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use modelrename::EntityKind;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "modelrename")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Project-wide rename for Power BI projects",
    long_about = "Renames tables, columns, measures and relationships in a PBIP project \
                  and rewrites every reference in the semantic model (TMDL, DAX) and the \
                  report (visual bindings) in one all-or-nothing transaction."
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (json, text, markdown)
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Path to the project: folder, .pbip file or .SemanticModel folder (defaults to current directory)
    #[arg(short = 'p', long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tables, columns, measures and relationships
    Describe,

    /// Find all references to an entity
    References {
        /// Entity kind (table, column, measure, relationship)
        kind: EntityKind,

        /// Entity name
        name: String,

        /// Owning table, for columns and measures
        #[arg(short, long)]
        table: Option<String>,

        /// Include declarations
        #[arg(short, long)]
        include_declarations: bool,
    },

    /// Rename one entity everywhere it is referenced
    Rename {
        /// Entity kind (table, column, measure, relationship)
        kind: EntityKind,

        /// Current name
        old_name: String,

        /// New name
        new_name: String,

        /// Owning table, for columns and measures
        #[arg(short, long)]
        table: Option<String>,

        /// Show the changes without writing anything
        #[arg(long)]
        preview: bool,
    },

    /// Apply a JSON array of rename requests as one transaction
    Batch {
        /// JSON file with [{"kind", "table"?, "old_name", "new_name"}, ...]
        requests: PathBuf,

        /// Show the changes without writing anything
        #[arg(long)]
        preview: bool,
    },

    /// List backups of the project, newest first
    Backups,

    /// Copy a backup's files back over the project
    Restore {
        /// Backup directory
        backup: PathBuf,
    },

    /// Delete all but the newest backups
    PruneBackups {
        /// Number of backups to keep
        #[arg(short, long)]
        keep: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_filter = if cli.verbose {
        "modelrename=debug"
    } else {
        "modelrename=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    // Set project root
    let project = cli.project.unwrap_or_else(|| PathBuf::from("."));

    let result = match cli.command {
        Commands::Describe => commands::describe::run(project, &cli.format).await,
        Commands::References {
            kind,
            name,
            table,
            include_declarations,
        } => commands::references::run(kind, name, table, include_declarations, project, &cli.format).await,
        Commands::Rename {
            kind,
            old_name,
            new_name,
            table,
            preview,
        } => commands::rename::run(kind, old_name, new_name, table, preview, project, &cli.format).await,
        Commands::Batch { requests, preview } => commands::batch::run(requests, preview, project, &cli.format).await,
        Commands::Backups => commands::backups::list(project, &cli.format).await,
        Commands::Restore { backup } => commands::backups::restore(backup, project, &cli.format).await,
        Commands::PruneBackups { keep } => commands::backups::prune(keep, project, &cli.format).await,
    };

    if let Err(e) = result {
        output::OutputWriter::new(&cli.format).write_error(&e)?;
        std::process::exit(1);
    }

    Ok(())
}
