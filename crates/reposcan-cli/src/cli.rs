use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use reposcan::paths::{self, expand_path};
use reposcan::{
    clear_default_cache, delete_default_local_files, load_default_cached_paths,
    load_default_forest, save_default_cached_paths, save_default_forest, Configuration, Forest,
};
use tracing::debug;

use crate::render::{render_forest, Filter};
use crate::worker::run_scan;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "reposcan",
    version,
    about = "Find git repositories and report their status"
)]
pub(crate) struct Cli {
    /// Configuration file to use instead of the default one.
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Print scan messages and debug logs.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Worker thread count.
    #[arg(short, long, global = true)]
    pub(crate) jobs: Option<usize>,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Search every configured path and refresh all repositories found.
    Scan(ViewArgs),
    /// Refresh the cached repository list, scanning if there is none.
    Refresh(ViewArgs),
    /// Print the last saved report.
    Show(ViewArgs),
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Args)]
pub(crate) struct ViewArgs {
    /// Only print repositories with pending changes.
    #[arg(long)]
    pub(crate) pending: bool,
}

impl ViewArgs {
    fn filter(&self) -> Filter {
        if self.pending {
            Filter::PendingChanges
        } else {
            Filter::All
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    Show,
    AddSearch { path: String },
    AddIgnore { path: String },
    RmSearch { path: String },
    RmIgnore { path: String },
}

#[derive(Subcommand)]
pub(crate) enum CacheCommand {
    /// Forget the cached repository list and report.
    Clear {
        /// Delete the whole state directory, configuration included.
        #[arg(long)]
        all: bool,
    },
}

pub(crate) fn run(cli: Cli) -> CliResult<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => paths::config_path()?,
    };
    debug!(path = %config_path.display(), "using configuration file");

    match cli.command {
        Commands::Scan(view) => {
            let configuration = load_configuration(&config_path, cli.jobs);
            let forest = run_scan(configuration, None, cli.verbose)?;
            save_and_print(&forest, view.filter())?;
        }
        Commands::Refresh(view) => {
            let configuration = load_configuration(&config_path, cli.jobs);
            let cached_paths = load_default_cached_paths()?;
            if cached_paths.is_none() && cli.verbose {
                eprintln!("no cached repository list; scanning");
            }
            let forest = run_scan(configuration, cached_paths, cli.verbose)?;
            save_and_print(&forest, view.filter())?;
        }
        Commands::Show(view) => match load_default_forest()? {
            Some(forest) => print!("{}", render_forest(&forest, &home_dir(), view.filter())),
            None => println!("no cached report"),
        },
        Commands::Config { command } => run_config_command(command, &config_path)?,
        Commands::Cache { command } => run_cache_command(command)?,
    }

    Ok(())
}

fn run_config_command(command: ConfigCommand, config_path: &Path) -> CliResult<()> {
    // A file that exists but cannot be parsed is reported, never replaced.
    let mut configuration =
        Configuration::load(config_path)?.unwrap_or_else(Configuration::default_for_platform);

    match command {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&configuration)?);
        }
        ConfigCommand::AddSearch { path } => {
            if configuration.add_search_path(&path) {
                configuration.save(config_path)?;
                println!("added search path {}", path.trim());
            } else {
                println!("search path {} already configured", path.trim());
            }
        }
        ConfigCommand::AddIgnore { path } => {
            if configuration.add_ignored_path(&path) {
                configuration.save(config_path)?;
                println!("added ignored path {}", path.trim());
            } else {
                println!("ignored path {} already configured", path.trim());
            }
        }
        ConfigCommand::RmSearch { path } => {
            if !configuration.remove_search_path(&path) {
                return Err(format!("search path not found: {}", path.trim()).into());
            }
            configuration.save(config_path)?;
            println!("removed search path {}", path.trim());
        }
        ConfigCommand::RmIgnore { path } => {
            if !configuration.remove_ignored_path(&path) {
                return Err(format!("ignored path not found: {}", path.trim()).into());
            }
            configuration.save(config_path)?;
            println!("removed ignored path {}", path.trim());
        }
    }

    Ok(())
}

fn run_cache_command(command: CacheCommand) -> CliResult<()> {
    match command {
        CacheCommand::Clear { all: false } => {
            let removed = clear_default_cache()?;
            println!("removed {removed} cached file(s)");
        }
        CacheCommand::Clear { all: true } => {
            let root = paths::cache_root()?;
            if delete_default_local_files()? {
                println!("removed {}", root.display());
            } else {
                println!("nothing to remove at {}", root.display());
            }
        }
    }
    Ok(())
}

fn load_configuration(config_path: &Path, jobs: Option<usize>) -> Configuration {
    let mut configuration = Configuration::load_or_default(config_path);
    if jobs.is_some() {
        configuration.max_concurrency = jobs;
    }
    configuration
}

fn save_and_print(forest: &Forest, filter: Filter) -> CliResult<()> {
    save_default_cached_paths(&forest.repository_paths())?;
    save_default_forest(forest)?;
    print!("{}", render_forest(forest, &home_dir(), filter));
    Ok(())
}

fn home_dir() -> PathBuf {
    expand_path("~")
}
