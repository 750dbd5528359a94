use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use userscript_launcher_lib::launch::{export_profile, import_profile, prepare_launch};
use userscript_launcher_lib::preload::{render_from_artifact, PreloadOptions};
use userscript_launcher_lib::store::DEFAULT_PROFILE;
use userscript_launcher_lib::{ConfigStore, HttpFetcher, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "userscript-launcher",
    version,
    about = "Launch game pages with a profile of userscripts injected"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<CommandKind>,
}

#[derive(Subcommand, Debug)]
enum CommandKind {
    /// Open the launcher window (default when no command is given).
    Launch,
    /// List games and their profiles.
    Games,
    /// Fetch requires and write a profile's bundle artifact, keeping it on disk.
    Bundle {
        #[arg(long)]
        game: String,
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,
        /// Directory for the artifact (defaults to the configured bundle dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the initialization script for a bundle artifact.
    Preload {
        bundle_path: PathBuf,
        /// Forward page console output to the launcher
        #[arg(long)]
        forward_console: bool,
    },
    /// Print a profile as JSON, or write it to a file.
    Export {
        #[arg(long)]
        game: String,
        #[arg(long)]
        profile: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a profile from an http(s) URL or a JSON file.
    Import {
        #[arg(long)]
        game: String,
        source: String,
    },
    /// Add a game with its own locked default profile.
    AddGame {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    let store = ConfigStore::new(settings.config_path());

    match cli.command {
        None | Some(CommandKind::Launch) => launch(settings),
        Some(CommandKind::Games) => {
            let config = store.load();
            for game in &config.games {
                println!("{} ({}) {}", game.id, game.name, game.url);
                for (id, profile) in config.profiles(&game.id).into_iter().flatten() {
                    let lock = if profile.locked { " [locked]" } else { "" };
                    println!("  {}: {}{} - {} script(s)", id, profile.name, lock, profile.scripts.len());
                }
            }
            Ok(())
        }
        Some(CommandKind::Bundle { game, profile, out }) => {
            let config = store.load();
            let target = config
                .game(&game)
                .with_context(|| format!("unknown game '{}'", game))?;
            let profile = config.profile(&game, &profile)?;
            let fetcher = HttpFetcher::from_settings(&settings)?;
            let dir = out.unwrap_or_else(|| settings.bundle_dir.clone());

            let prepared = prepare_launch(&fetcher, target, profile, &dir)?;
            println!("{}", prepared.artifact.keep().display());
            Ok(())
        }
        Some(CommandKind::Preload {
            bundle_path,
            forward_console,
        }) => {
            let options = PreloadOptions {
                forward_console,
                ..PreloadOptions::from_settings(&settings)
            };
            println!("{}", render_from_artifact(&bundle_path, &options));
            Ok(())
        }
        Some(CommandKind::Export { game, profile, out }) => {
            let config = store.load();
            let json = export_profile(config.profile(&game, &profile)?)?;
            match out {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        Some(CommandKind::Import { game, source }) => {
            let mut config = store.load();
            let fetcher = HttpFetcher::from_settings(&settings)?;
            let profile = import_profile(&fetcher, &source)?;
            let id = config.insert_profile(&game, profile)?;
            store.save(&config)?;
            println!("{}", id);
            Ok(())
        }
        Some(CommandKind::AddGame { name, url }) => {
            let mut config = store.load();
            let id = config.add_game(&name, &url)?.id.clone();
            store.save(&config)?;
            println!("{}", id);
            Ok(())
        }
    }
}

#[cfg(feature = "desktop")]
fn launch(settings: Settings) -> Result<()> {
    userscript_launcher_lib::desktop::run_with(settings).context("error while running tauri application")
}

#[cfg(not(feature = "desktop"))]
fn launch(_settings: Settings) -> Result<()> {
    use clap::CommandFactory;

    Cli::command().print_help()?;
    anyhow::bail!("this build has no window support; rebuild with the default `desktop` feature")
}
