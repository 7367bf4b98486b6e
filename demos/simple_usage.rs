use journal_reader::watch_journal;
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Watch the fixture journals and print each event batch
    let mut stream = watch_journal("fixtures", None).await?;

    println!("Watching journal directory - emitting Vec<Event>...");

    let mut count = 0;
    while let Ok(Some(events)) = tokio::time::timeout(Duration::from_secs(2), stream.next()).await {
        println!("Received batch #{} with {} events:", count + 1, events.len());
        for (i, event) in events.iter().enumerate() {
            println!(
                "  [{}]: {} at {}",
                i + 1,
                event.kind(),
                event.timestamp().unwrap_or("<no timestamp>")
            );
        }
        println!("---");

        count += 1;
        if count >= 2 {
            break;
        }
    }

    Ok(())
}
