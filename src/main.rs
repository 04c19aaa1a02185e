use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rusqlite::Connection;

use covsync::batch::{BatchLimits, MAX_BATCH_CHARS};
use covsync::cli;
use covsync::db;
use covsync::detect::ExtensionLanguageDetector;
use covsync::model::{Level, RunContext};
use covsync::parsers::lcov::LcovParser;
use covsync::pipeline::{resolve_branch, CiSource, Pipeline};
use covsync::postgrest::PostgrestStore;
use covsync::store::CoverageStore;

/// covsync: reconcile CI coverage artifacts into per-file and per-repository coverage.
#[derive(Parser)]
#[command(name = "covsync", version, about)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true, env = "COVSYNC_DB", default_value = ".covsync.db")]
    db: PathBuf,

    /// Supabase project URL. With a service key, coverage is written there
    /// instead of SQLite.
    #[arg(long, global = true, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    #[arg(long, global = true, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    /// Character budget for one existing-coverage lookup.
    #[arg(long, global = true, default_value_t = MAX_BATCH_CHARS)]
    max_batch_chars: usize,

    /// More output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Identity of the run being recorded.
#[derive(Args)]
struct RunArgs {
    /// Repository owner login.
    #[arg(long)]
    owner: String,

    /// Repository name.
    #[arg(long)]
    repo: String,

    #[arg(long)]
    owner_id: i64,

    #[arg(long)]
    repo_id: i64,

    /// Workflow run id (GitHub) or check suite id (CircleCI).
    #[arg(long, default_value_t = 0)]
    run_id: i64,

    /// Branch the run built. Omitted for detached-HEAD runs.
    #[arg(long)]
    branch: Option<String>,

    /// Recorded as the author of new rows and the updater of all rows.
    #[arg(long, default_value = "covsync")]
    user: String,
}

impl RunArgs {
    fn into_context(self) -> RunContext {
        RunContext {
            owner_id: self.owner_id,
            owner_name: self.owner,
            repo_id: self.repo_id,
            repo_name: self.repo,
            run_id: self.run_id,
            branch_name: resolve_branch(self.branch.as_deref()),
            user_name: self.user,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pull coverage artifacts of a CI run and record them.
    Ingest {
        /// CI provider: github or circleci.
        #[arg(long, default_value = "github")]
        source: CiSource,

        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// GitHub API root, for GitHub Enterprise.
        #[arg(long, env = "GITHUB_API_URL")]
        github_api: Option<String>,

        #[arg(long, env = "CIRCLECI_TOKEN", hide_env_values = true)]
        circleci_token: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Record local LCOV files without contacting any CI provider.
    IngestFile {
        /// LCOV files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// File listing the repository's paths, one per line
        /// (e.g. the output of `git ls-files`).
        #[arg(long)]
        files_from: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List stored coverage for a repository.
    Files {
        #[arg(long)]
        repo_id: i64,

        /// Only show one level (file, directory, repository).
        #[arg(long)]
        level: Option<Level>,

        /// Sort by line coverage ascending (worst first).
        #[arg(long)]
        sort_by_coverage: bool,
    },

    /// Show the repository coverage history.
    History {
        #[arg(long)]
        repo_id: i64,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn open_db(path: &Path) -> Result<Connection> {
    let conn = db::open(path).context("Failed to open database")?;
    db::init_schema(&conn).context("Failed to initialize schema")?;
    Ok(conn)
}

fn open_store(
    db_path: &Path,
    supabase_url: Option<&str>,
    supabase_key: Option<&str>,
) -> Result<Box<dyn CoverageStore>> {
    match (supabase_url, supabase_key) {
        (Some(url), Some(key)) => Ok(Box::new(PostgrestStore::new(url, key))),
        _ => Ok(Box::new(open_db(db_path)?)),
    }
}

fn main() -> Result<()> {
    let Cli {
        db: db_path,
        supabase_url,
        supabase_key,
        max_batch_chars,
        verbose,
        command,
    } = Cli::parse();
    init_logging(verbose);

    let limits = BatchLimits {
        max_chars: max_batch_chars,
        ..BatchLimits::default()
    };
    let parser = LcovParser;
    let detector = ExtensionLanguageDetector;

    let output = match command {
        Commands::Ingest {
            source,
            github_token,
            github_api,
            circleci_token,
            run,
        } => {
            let mut store = open_store(&db_path, supabase_url.as_deref(), supabase_key.as_deref())?;
            let mut pipeline = Pipeline {
                store: store.as_mut(),
                parser: &parser,
                detector: &detector,
                limits,
            };
            cli::cmd_ingest(
                &mut pipeline,
                source,
                github_token.as_deref(),
                github_api.as_deref(),
                circleci_token,
                &run.into_context(),
            )?
        }
        Commands::IngestFile {
            files,
            files_from,
            run,
        } => {
            let mut store = open_store(&db_path, supabase_url.as_deref(), supabase_key.as_deref())?;
            let mut pipeline = Pipeline {
                store: store.as_mut(),
                parser: &parser,
                detector: &detector,
                limits,
            };
            cli::cmd_ingest_file(&mut pipeline, &files, files_from.as_deref(), &run.into_context())?
        }
        Commands::Files {
            repo_id,
            level,
            sort_by_coverage,
        } => {
            let conn = open_db(&db_path)?;
            cli::cmd_files(&conn, repo_id, level, sort_by_coverage)?
        }
        Commands::History { repo_id } => {
            let conn = open_db(&db_path)?;
            cli::cmd_history(&conn, repo_id)?
        }
    };
    print!("{}", output);
    Ok(())
}
