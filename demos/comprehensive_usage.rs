use journal_reader::{
    BootstrapScanner, EntryParser, JournalWatcher, TailReader, WatchConfig, decode_lines,
    list_journals, watch_journal,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Journal Reader Comprehensive Example ===\n");

    println!("1. Stream usage - bootstrap batch of the current journal:");
    stream_usage().await?;

    println!("\n{}\n", "=".repeat(50));

    println!("2. Callback usage - custom state kinds with forced polling:");
    callback_usage().await?;

    println!("\n{}\n", "=".repeat(50));

    println!("3. Reader usage - tailing every journal from the start:");
    reader_usage().await?;

    Ok(())
}

async fn stream_usage() -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = watch_journal("fixtures", None).await?;

    match tokio::time::timeout(Duration::from_millis(200), stream.next()).await {
        Ok(Some(events)) => {
            println!("  Received {} state events:", events.len());
            for event in &events {
                println!(
                    "    {:<10} {}",
                    event.kind(),
                    event.timestamp().unwrap_or("-")
                );
            }
        }
        Ok(None) => println!("  Stream ended"),
        Err(_) => println!("  Timeout - no state events in the current journal"),
    }

    Ok(())
}

async fn callback_usage() -> Result<(), Box<dyn std::error::Error>> {
    let config = WatchConfig {
        force_polling: true,
        state_kinds: vec!["LoadGame".to_string(), "Music".to_string()],
        ..WatchConfig::default()
    };
    let mut watcher = JournalWatcher::with_config("fixtures", config).await?;
    println!(
        "  Backend: {:?}, current journal: {:?}",
        watcher.backend(),
        watcher.current_journal().await
    );

    watcher
        .register_callback(|events| {
            for event in events {
                let track = event
                    .get("MusicTrack")
                    .and_then(|v| v.as_str())
                    .unwrap_or("-");
                println!("    {} (track: {})", event.kind(), track);
            }
        })
        .await;
    watcher.trigger_current_journal_check().await;

    watcher.stop().await;
    println!("  Watcher phase after stop: {:?}", watcher.phase().await);

    Ok(())
}

async fn reader_usage() -> Result<(), Box<dyn std::error::Error>> {
    let parser = EntryParser::default();

    for path in list_journals(Path::new("fixtures"))? {
        let content = tokio::fs::read(&path).await?;
        let lines = decode_lines(&content);
        let events = parser.parse_batch(lines.lines().iter().copied())?;

        let mut counts = BTreeMap::new();
        for event in &events {
            *counts.entry(event.kind().to_string()).or_insert(0) += 1;
        }

        println!("  {}:", path.display());
        for (kind, count) in counts {
            println!("    {}: {}", kind, count);
        }

        // No state kinds: attaching skips the whole history.
        let mut reader = TailReader::new(
            EntryParser::default(),
            BootstrapScanner::new(Vec::<String>::new()),
        );
        let replayed = reader.process(&path).await?;
        let offset = reader.cursor().map(|c| c.offset()).unwrap_or(0);
        println!(
            "    bootstrap replayed {} events, cursor at byte {}",
            replayed.len(),
            offset
        );
    }

    Ok(())
}
