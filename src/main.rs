use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dockwatch::{
    import_from_runtime, poll_once, AppSettings, CommandInvoker, ConfigManager, JsonFileSettings,
    PollScheduler, SnapshotSink, StatusSnapshot,
};

#[derive(Parser, Debug)]
#[command(name = "dockwatch")]
#[command(about = "Watch the run state of selected docker containers")]
#[command(version)]
struct Args {
    /// Runtime options file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Monitor settings file (JSON) holding the interval and watch list
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll container status and print each snapshot
    Watch {
        /// Poll once and exit; the exit code reflects aggregate health
        #[arg(long)]
        once: bool,

        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,

        /// Also write the latest snapshot to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the watch list and poll interval
    List,
    /// Add a container to the watch list
    Add { name: String },
    /// Remove a container from the watch list
    Remove { name: String },
    /// Add every container docker knows about to the watch list
    Import,
    /// Set the poll interval in seconds (clamped to 5..=300)
    Interval {
        #[arg(allow_negative_numbers = true)]
        seconds: i64,
    },
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = if args.debug { "dockwatch=debug" } else { "dockwatch=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut settings = AppSettings::load(args.config.as_deref())
        .context("Failed to load runtime options")?;
    if let Some(path) = args.settings {
        settings.settings_path = path;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args.command, settings))
}

async fn run(command: Command, settings: AppSettings) -> Result<ExitCode> {
    let store = Arc::new(
        JsonFileSettings::open(&settings.settings_path).with_context(|| {
            format!("Failed to open {}", settings.settings_path.display())
        })?,
    );
    let config = Arc::new(ConfigManager::load(store.clone())?);

    match command {
        Command::Watch { once: true, json, output } => {
            let watch_list = config.get_config().watch_list().to_vec();
            let snapshot = poll_once(
                &CommandInvoker::new(),
                &settings.status_command(),
                settings.timeout(),
                &watch_list,
            )
            .await;
            if let Some(path) = output {
                SnapshotSink::file(path).publish(snapshot.clone()).await;
            }
            print_snapshot(&snapshot, json)?;
            return Ok(if snapshot.aggregate_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Command::Watch { once: false, json, output } => {
            watch(store, config, &settings, json, output).await?;
        }
        Command::List => {
            let current = config.get_config();
            println!("Interval: {}s", current.interval_seconds());
            for name in current.watch_list() {
                println!("{name}");
            }
        }
        Command::Add { name } => {
            if config.add_container(&name)? {
                println!("Watching {}", name.trim());
            } else {
                println!("Already watching {}", name.trim());
            }
        }
        Command::Remove { name } => {
            if config.remove_container(&name)? {
                println!("No longer watching {name}");
            } else {
                println!("{name} was not being watched");
            }
        }
        Command::Import => {
            let added = import_from_runtime(
                &config,
                &CommandInvoker::new(),
                &settings.names_command(),
                settings.timeout(),
            )
            .await?;
            if added.is_empty() {
                println!("No new containers");
            } else {
                println!("Added {}", added.join(", "));
            }
        }
        Command::Interval { seconds } => {
            config.set_interval(seconds)?;
            println!("Interval: {}s", config.get_config().interval_seconds());
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn watch(
    store: Arc<JsonFileSettings>,
    config: Arc<ConfigManager>,
    settings: &AppSettings,
    json: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let store_watcher = store.spawn_watcher(settings.store_poll_period());
    let store_listener = config.spawn_store_listener();

    let file_sink = output.map(SnapshotSink::file);
    let (sink, mut rx) = SnapshotSink::channel(16);
    let handle = PollScheduler::builder(config, sink)
        .invoker(Arc::new(CommandInvoker::new()))
        .command(settings.status_command())
        .timeout(settings.timeout())
        .build()
        .start();
    info!("Watching settings in {}", store.path().display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            snapshot = rx.recv() => match snapshot {
                Some(snapshot) => {
                    if let Some(file_sink) = &file_sink {
                        file_sink.publish(snapshot.clone()).await;
                    }
                    print_snapshot(&snapshot, json)?;
                }
                None => break,
            },
        }
    }

    handle.stop().await;
    store_listener.abort();
    store_watcher.abort();
    Ok(())
}

fn print_snapshot(snapshot: &StatusSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    if let Some(error) = snapshot.error() {
        println!("{error}");
        return Ok(());
    }

    let down = snapshot.unhealthy().count();
    if down == 0 {
        println!("All {} containers running", snapshot.len());
    } else {
        println!("{} of {} containers not running", down, snapshot.len());
    }

    let width = snapshot
        .items()
        .iter()
        .map(|item| item.name.len())
        .max()
        .unwrap_or(0);
    for item in snapshot.items() {
        println!(
            "  {:<7} {:<width$}  {}",
            item.state.symbol(),
            item.name,
            item.status_text(),
        );
    }
    Ok(())
}
