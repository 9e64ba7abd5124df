//! # Tutorial Harness CLI (`tut`)
//!
//! The `tut` binary turns a codebase into a multi-chapter Markdown tutorial.
//!
//! ## Usage
//!
//! ```bash
//! tut --config ./config/tut.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tut generate` | Acquire a codebase and write its tutorial |
//! | `tut fetch` | List the files a `generate` would analyze, without calling the LLM |
//! | `tut serve web` | Start the HTTP server (`POST /generate`) |
//!
//! ## Examples
//!
//! ```bash
//! # Tutorial for a GitHub repository
//! tut generate --repo https://github.com/owner/repo
//!
//! # Tutorial for a local checkout, in French, Python files only
//! tut generate --dir ../my-project -i '**/*.py' --language french
//!
//! # Check what would be analyzed
//! tut fetch --dir ../my-project --max-size 50000
//!
//! # Serve the HTTP API
//! tut serve web --config ./config/tut.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use tutorial_harness::acquire::AcquisitionFilter;
use tutorial_harness::config::{self, Config};
use tutorial_harness::connector_archive::ArchiveConnector;
use tutorial_harness::connector_fs::FilesystemConnector;
use tutorial_harness::connector_github::GitHubConnector;
use tutorial_harness::llm::CompletionGateway;
use tutorial_harness::logging;
use tutorial_harness::models::Acquisition;
use tutorial_harness::package;
use tutorial_harness::pipeline::{Pipeline, PipelineContext};
use tutorial_harness::progress::{PipelineEvent, ProgressMode};
use tutorial_harness::server;
use tutorial_harness::traits::Connector;

const DEFAULT_CONFIG: &str = "./config/tut.toml";

/// Tutorial Harness CLI: generate beginner-friendly tutorials from a codebase.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tut.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tut",
    about = "Tutorial Harness: turn a codebase into a multi-chapter tutorial",
    version,
    long_about = "Tutorial Harness acquires a codebase (GitHub, local directory or zip archive), \
    asks an LLM to identify its core abstractions, relate and order them, and writes one \
    Markdown chapter per abstraction plus an index with a Mermaid diagram."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tut.toml`. When the default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a tutorial.
    ///
    /// Runs abstraction discovery, relationship inference, chapter
    /// ordering and chapter authoring, then writes `index.md` and one
    /// file per chapter to `<output>/<project_name>/`.
    Generate {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Project name (defaults to the repository or directory name).
        #[arg(long)]
        name: Option<String>,

        /// Language for the generated prose.
        #[arg(long)]
        language: Option<String>,

        /// Upper bound on the number of abstractions (chapters) requested.
        #[arg(long)]
        max_abstractions: Option<usize>,

        /// Do not read or write the prompt cache.
        #[arg(long)]
        no_cache: bool,

        /// Output directory (defaults to `[output].dir`).
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Progress display on stderr.
        #[arg(long, value_enum, default_value_t = ProgressArg::Auto)]
        progress: ProgressArg,
    },

    /// List the files a `generate` would analyze. No LLM calls are made.
    Fetch {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Output as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        target: ServeTarget,
    },
}

#[derive(Subcommand)]
enum ServeTarget {
    /// HTTP API: `POST /generate` and `GET /health`.
    Web,
}

/// Where the code comes from. Exactly one is required.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// GitHub repository URL (`https://github.com/<owner>/<repo>[/tree/<ref>[/<subdir>]]`).
    #[arg(long)]
    repo: Option<String>,

    /// Local directory.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Zip archive.
    #[arg(long)]
    archive: Option<PathBuf>,
}

#[derive(Args)]
struct FilterArgs {
    /// Include glob (repeatable). Replaces the configured include list.
    #[arg(long = "include", short = 'i')]
    include: Vec<String>,

    /// Exclude glob (repeatable). Replaces the configured exclude list.
    #[arg(long = "exclude", short = 'e')]
    exclude: Vec<String>,

    /// Maximum file size in bytes.
    #[arg(long = "max-size")]
    max_size: Option<u64>,

    /// GitHub token (defaults to the `[acquisition].github_token_env` variable).
    #[arg(long)]
    token: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

fn build_filter(cfg: &Config, args: &FilterArgs) -> Result<AcquisitionFilter> {
    let acq = &cfg.acquisition;
    let include = if args.include.is_empty() {
        &acq.include_globs
    } else {
        &args.include
    };
    let exclude = if args.exclude.is_empty() {
        &acq.exclude_globs
    } else {
        &args.exclude
    };
    AcquisitionFilter::new(include, exclude, args.max_size.unwrap_or(acq.max_file_size))
        .context("Invalid include/exclude pattern")
}

fn build_connector(cfg: &Config, source: &SourceArgs, filter: &FilterArgs) -> Result<Box<dyn Connector>> {
    if let Some(url) = &source.repo {
        let token = filter
            .token
            .clone()
            .or_else(|| std::env::var(&cfg.acquisition.github_token_env).ok());
        return Ok(Box::new(GitHubConnector::new(
            url,
            &cfg.acquisition.github_api_url,
            token,
        )?));
    }
    if let Some(dir) = &source.dir {
        return Ok(Box::new(FilesystemConnector::new(dir)));
    }
    if let Some(archive) = &source.archive {
        return Ok(Box::new(ArchiveConnector::from_path(archive)?));
    }
    bail!("one of --repo, --dir or --archive is required")
}

async fn acquire(
    cfg: &Config,
    source: &SourceArgs,
    filter_args: &FilterArgs,
) -> Result<(Box<dyn Connector>, Acquisition)> {
    let connector = build_connector(cfg, source, filter_args)?;
    let filter = build_filter(cfg, filter_args)?;
    let acquisition = connector
        .acquire(&filter)
        .await
        .with_context(|| format!("Failed to acquire {} source", connector.connector_type()))?;
    Ok((connector, acquisition))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose)?;
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Generate {
            source,
            filter,
            name,
            language,
            max_abstractions,
            no_cache,
            output,
            progress,
        } => {
            let reporter = progress.mode().reporter();
            let (connector, acquisition) = acquire(&cfg, &source, &filter).await?;
            reporter.report(PipelineEvent::Acquired {
                files: acquisition.files.len(),
                skipped: acquisition.skipped.len(),
            });

            let gateway = CompletionGateway::from_config(&cfg.llm, &cfg.cache)?;
            let mut ctx = PipelineContext::from_config(&cfg, gateway).with_progress(reporter);
            if let Some(language) = language {
                ctx = ctx.with_language(language);
            }
            if let Some(max) = max_abstractions {
                ctx = ctx.with_max_abstractions(max);
            }
            if no_cache {
                ctx = ctx.with_cache(false);
            }

            let project_name = name.unwrap_or_else(|| acquisition.project_name.clone());
            let source_url = connector.source_url();
            let docs = Pipeline::new(ctx)
                .generate(acquisition.files, &project_name, source_url.as_deref())
                .await?;

            let out_dir = output.unwrap_or_else(|| cfg.output.dir.clone());
            let written = package::write_to_dir(&docs, &out_dir)?;
            println!(
                "Tutorial for {} written to {} ({} documents)",
                project_name,
                written.display(),
                docs.documents.len()
            );
        }
        Commands::Fetch {
            source,
            filter,
            json,
        } => {
            let (_, acquisition) = acquire(&cfg, &source, &filter).await?;
            if json {
                let out = serde_json::json!({
                    "project_name": acquisition.project_name,
                    "files": acquisition
                        .files
                        .iter()
                        .map(|f| serde_json::json!({ "path": f.path, "size": f.size }))
                        .collect::<Vec<_>>(),
                    "skipped": acquisition.skipped,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Project: {}", acquisition.project_name);
                for file in &acquisition.files {
                    println!("  {:>8}  {}", file.size, file.path);
                }
                for skipped in &acquisition.skipped {
                    println!("  skipped   {} ({})", skipped.path, skipped.reason);
                }
                println!(
                    "{} files, {} skipped",
                    acquisition.files.len(),
                    acquisition.skipped.len()
                );
            }
        }
        Commands::Serve { target } => match target {
            ServeTarget::Web => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
