//! textembed CLI - turn text into embedding vectors from the command line

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{embed, info, ModelArgs};
use config::EmbedConfig;
use output::OutputFormat;

/// Text embeddings with a local transformer model.
#[derive(Parser)]
#[command(name = "textembed")]
#[command(author, version)]
#[command(about = "Text embeddings with a local transformer model")]
#[command(propagate_version = true)]
#[command(after_help = "Examples:
  textembed embed -m sentence-transformers/all-MiniLM-L6-v2 -a models/minilm \"hello world\"
  textembed info -m sentence-transformers/all-MiniLM-L6-v2 -a models/minilm --format json")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format (overrides config default)
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Configuration file (default: ./.textembed.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the embedding of each text
    #[command(visible_alias = "e")]
    Embed {
        #[command(flatten)]
        model: ModelArgs,

        /// Texts to embed
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Load the pipeline and report its configuration
    Info {
        #[command(flatten)]
        model: ModelArgs,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug,hf_hub=info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => EmbedConfig::load_file(path),
        None => EmbedConfig::load(std::path::Path::new(".")),
    };

    // Resolve output format: CLI flag > config default > Table
    let format = cli.format.unwrap_or_else(|| {
        config
            .default_format()
            .and_then(|f| f.parse().ok())
            .unwrap_or(OutputFormat::Table)
    });
    output::configure_colors(config.use_color());

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            let _ = Cli::command().print_help();
            println!();
            return Ok(());
        }
    };

    match command {
        Commands::Embed { model, texts } => {
            let plan = model.plan(&config, cli.verbose)?;
            let model_id = plan.model_id.clone();
            let pipeline = plan.init().await?;
            embed::run(pipeline, &model_id, &texts, format).await
        }
        Commands::Info { model } => {
            let pipeline = model.plan(&config, cli.verbose)?.init().await?;
            info::run(pipeline, format).await
        }
    }
}
