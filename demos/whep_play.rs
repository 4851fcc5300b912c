//! WHEP Play
//!
//! Pulls a stream from a WHEP endpoint (MediaMTX, portal, ...) and logs
//! status changes and received tracks until Ctrl+C.
//!
//! Usage:
//!   cargo run --example whep_play -- --url http://localhost:8889/mystream/whep
//!   WHEP_API_KEY_ID=cam1 WHEP_API_KEY=secret cargo run --example whep_play
//!   RUST_LOG=whep_reader=debug cargo run --example whep_play -- --url <url>

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use whep_reader::{ReaderConfig, StreamReader, TrackEvent};

fn print_usage() {
    println!("WHEP Play");
    println!();
    println!("Usage:");
    println!("  whep_play --url <url>           Read from a WHEP endpoint");
    println!("  whep_play                       Read using WHEP_URL or WHEP_API_KEY_ID/WHEP_API_KEY");
    println!();
    println!("Options:");
    println!("  --reconnect-ms <ms>             Delay before reconnecting (default 3000)");
}

fn parse_args() -> Result<Option<ReaderConfig>, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut url: Option<String> = None;
    let mut reconnect_ms: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" if i + 1 < args.len() => {
                url = Some(args[i + 1].clone());
                i += 1;
            }
            "--reconnect-ms" if i + 1 < args.len() => {
                let ms = args[i + 1]
                    .parse()
                    .map_err(|_| format!("Invalid --reconnect-ms value: {}", args[i + 1]))?;
                reconnect_ms = Some(ms);
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
        i += 1;
    }

    let mut config = match url {
        Some(url) => ReaderConfig::new(&url),
        None => ReaderConfig::from_env(),
    }
    .map_err(|e| e.to_string())?;

    if let Some(ms) = reconnect_ms {
        config = config.reconnect_delay(Duration::from_millis(ms));
    }

    Ok(Some(config))
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match parse_args() {
        Ok(Some(config)) => config,
        Ok(None) => return,
        Err(e) => {
            println!("Error: {}", e);
            println!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    println!("=================================");
    println!("  WHEP Play");
    println!("=================================");
    println!("Endpoint: {}", config.url);
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        r.store(false, Ordering::SeqCst);
    }) {
        println!("ERROR: Failed to install Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    let on_track = |track: TrackEvent| {
        log::info!(
            "Track: kind={} id={} streams={:?}",
            track.kind.as_str(),
            track.track_id,
            track.stream_ids
        );
    };

    let reader = match StreamReader::connect(config, on_track) {
        Ok(reader) => reader,
        Err(e) => {
            println!("ERROR: Failed to start reader: {}", e);
            std::process::exit(1);
        }
    };

    let mut status = reader.subscribe();
    while running.load(Ordering::SeqCst) {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("[STATUS] {}", current.message());
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
    }

    reader.stop().await;
    println!("Done.");
}
