//! Simple example: track a kline window and print its changes
//!
//! Run with: cargo run --example kline_stream

use bybit_trackers::{FactoryConfig, SeriesChange, TrackerFactory, WindowBound};
use bybit_types::{Category, KlineInterval};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let factory = TrackerFactory::new(FactoryConfig::default());
    let tracker = factory.create_kline_tracker(
        "BTCUSDT",
        Category::Linear,
        KlineInterval::Min1,
        WindowBound::of_limit(50),
    )?;
    tracker.start();

    println!("Tracking BTCUSDT 1m klines...");
    let mut changes = tracker.subscribe_changes();

    // Follow changes for 60 seconds
    let timeout = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            _ = &mut timeout => {
                println!("\nDone. Shutting down...");
                break;
            }
            batch = changes.recv() => {
                match batch {
                    Some(batch) => {
                        for change in batch {
                            match change {
                                SeriesChange::Appended(k) => {
                                    println!("new bucket {}: open={}", k.start, k.open)
                                }
                                SeriesChange::Revised(k) => {
                                    println!("bucket {}: close={} vol={}", k.start, k.close, k.volume)
                                }
                                SeriesChange::Evicted(start) => {
                                    println!("evicted bucket {start}")
                                }
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let window = tracker.current();
    println!(
        "window holds {} buckets, status {:?}",
        window.len(),
        tracker.status()
    );
    tracker.dispose();
    Ok(())
}
