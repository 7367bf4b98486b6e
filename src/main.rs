use journal_reader::{JournalWatcher, WatchConfig};
use std::env;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

struct Args {
    directory: PathBuf,
    config: Option<PathBuf>,
    force_polling: bool,
}

fn parse_args(args: &[String]) -> Option<Args> {
    let mut directory = None;
    let mut config = None;
    let mut force_polling = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--poll" => force_polling = true,
            "--config" => config = Some(PathBuf::from(iter.next()?)),
            _ if directory.is_none() && !arg.starts_with("--") => directory = Some(PathBuf::from(arg)),
            _ => return None,
        }
    }

    Some(Args {
        directory: directory?,
        config,
        force_polling,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(args_parsed) = parse_args(&args) else {
        eprintln!("Usage: {} <journal_dir> [--poll] [--config <file.json>]", args[0]);
        process::exit(1);
    };

    let mut config = match &args_parsed.config {
        Some(path) => match WatchConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                process::exit(1);
            }
        },
        None => WatchConfig::default(),
    };
    config.force_polling |= args_parsed.force_polling;

    let mut watcher = match JournalWatcher::with_config(&args_parsed.directory, config).await {
        Ok(watcher) => watcher,
        Err(e) => {
            eprintln!("Error setting up journal watcher: {}", e);
            process::exit(1);
        }
    };

    watcher
        .register_callback(|events| {
            for event in events {
                match serde_json::to_string(&event) {
                    Ok(json) => println!("{}", json),
                    Err(e) => tracing::warn!(error = %e, "cannot serialize event"),
                }
            }
        })
        .await;
    watcher.trigger_current_journal_check().await;

    tracing::info!(path = %args_parsed.directory.display(), "watching journals, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
    }

    watcher.stop().await;
}
