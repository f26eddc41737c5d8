//! fsinterpose - Inspect what the interposing provider serves
//!
//! Usage:
//!   fsinterpose cat <path>   - Print the bytes an open would serve
//!   fsinterpose stat <path>  - Print the url_stat result as JSON
//!   fsinterpose ls <dir>     - List a directory through the facade

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use fsinterpose::{
    config::{Config, InterceptConfig},
    provider::NativeProvider,
    proxy::ProxyProvider,
    registry::Registry,
    request::{
        OpenRequest, STREAM_OPEN_FOR_INCLUDE, STREAM_URL_STAT_LINK, STREAM_URL_STAT_QUIET,
        STREAM_USE_PATH,
    },
    stat::FileStat,
    wrapper::{DirWrapper, StreamWrapper},
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "fsinterpose")]
#[command(version)]
#[command(about = "Inspect what the interposing file provider serves")]
struct Cli {
    /// Configuration file path (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bytes an open of <path> would serve
    Cat {
        path: PathBuf,

        /// Open as executable source (enables substitution)
        #[arg(long)]
        include: bool,

        /// Search the include path for relative paths
        #[arg(long)]
        use_path: bool,

        /// Open mode
        #[arg(long, default_value = "rb")]
        mode: String,

        /// Substitute REPLACEMENT for TARGET
        #[arg(long, num_args = 2, value_names = ["TARGET", "REPLACEMENT"])]
        intercept: Option<Vec<PathBuf>>,
    },

    /// Print the url_stat result of <path> as JSON
    Stat {
        path: PathBuf,

        /// Do not follow a trailing symlink
        #[arg(long)]
        link: bool,

        /// Print null instead of failing
        #[arg(long)]
        quiet: bool,
    },

    /// List a directory
    Ls { dir: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG takes precedence over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
    }

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Commands::Cat {
        intercept: Some(paths),
        ..
    } = &cli.command
    {
        if let [target, replacement] = paths.as_slice() {
            config.intercept = Some(InterceptConfig {
                target: target.clone(),
                replacement: replacement.clone(),
            });
        }
    }

    let registry = Registry::new(Arc::new(NativeProvider::with_include_path(
        config.include_path.clone(),
    )));
    let proxy = ProxyProvider::from_config(registry.clone(), &config)?;
    registry.enable();

    match cli.command {
        Commands::Cat {
            path,
            include,
            use_path,
            mode,
            ..
        } => cmd_cat(&registry, &path, include, use_path, &mode),
        Commands::Stat { path, link, quiet } => cmd_stat(&proxy, &path, link, quiet),
        Commands::Ls { dir } => cmd_ls(&registry, &dir),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            let default = Config::default_path();
            if default.exists() {
                debug!("Using configuration at {:?}", default);
                Ok(Config::load(&default)?)
            } else {
                Ok(Config::from_env()?)
            }
        }
    }
}

fn cmd_cat(
    registry: &Arc<Registry>,
    path: &Path,
    include: bool,
    use_path: bool,
    mode: &str,
) -> anyhow::Result<()> {
    let mut options = 0;
    if include {
        options |= STREAM_OPEN_FOR_INCLUDE;
    }
    if use_path {
        options |= STREAM_USE_PATH;
    }

    let request = OpenRequest::new(path, mode, options)?;
    let mut stream = StreamWrapper::new(registry.clone());
    stream.stream_open(&request)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while !stream.eof() {
        let chunk = stream.read(64 * 1024);
        if chunk.is_empty() {
            break;
        }
        out.write_all(&chunk)?;
    }
    out.flush()?;
    stream.close();
    Ok(())
}

fn cmd_stat(proxy: &ProxyProvider, path: &Path, link: bool, quiet: bool) -> anyhow::Result<()> {
    let mut flags = 0;
    if link {
        flags |= STREAM_URL_STAT_LINK;
    }
    if quiet {
        flags |= STREAM_URL_STAT_QUIET;
    }

    let value = match proxy.url_stat(path, flags)? {
        Some(stat) => describe(&stat)?,
        None => serde_json::Value::Null,
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Stat record plus human readable timestamps
fn describe(stat: &FileStat) -> anyhow::Result<serde_json::Value> {
    let mut value = serde_json::to_value(stat)?;
    if let Some(fields) = value.as_object_mut() {
        for (key, secs) in [("atime", stat.atime), ("mtime", stat.mtime), ("ctime", stat.ctime)] {
            if let Some(time) = DateTime::<Utc>::from_timestamp(secs, 0) {
                fields.insert(format!("{}_utc", key), time.to_rfc3339().into());
            }
        }
    }
    Ok(value)
}

fn cmd_ls(registry: &Arc<Registry>, dir: &Path) -> anyhow::Result<()> {
    let mut wrapper = DirWrapper::new(registry.clone());
    if !wrapper.open(dir, 0, None) {
        bail!("cannot open directory {}", dir.display());
    }

    while let Some(name) = wrapper.read() {
        println!("{}", name.to_string_lossy());
    }
    wrapper.close();
    Ok(())
}
