use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vigil_judge::Judger;

use vigil_server::config::ServerConfig;
use vigil_server::publisher::EventPublisher;
use vigil_server::replay;
use vigil_server::scheduler::MultiScanScheduler;
use vigil_server::strategy_loader;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vigil-server [config.toml]    Judge metric batches read from stdin, one JSON value per line");
    eprintln!();
    eprintln!("Events are written to stdout as JSON lines; logs go to stderr.");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        Some(path) => run(ServerConfig::load(path)?).await,
        None => run(ServerConfig::default()).await,
    }
}

async fn run(config: ServerConfig) -> Result<()> {
    let judger = Arc::new(Judger::new(config.judge.clone()));
    let (publisher, mut events_rx) = EventPublisher::channel();

    publisher.publish(strategy_loader::reload_judger(&config, &judger)?);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events_rx.recv().await {
            let line = match replay::render_event(&event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "Dropping unencodable event");
                    continue;
                }
            };
            if let Err(e) = stdout.write_all(format!("{line}\n").as_bytes()).await {
                tracing::error!(error = %e, "Failed to write event");
                break;
            }
        }
        let _ = stdout.flush().await;
    });

    let scheduler = Arc::new(MultiScanScheduler::new(
        Arc::clone(&judger),
        publisher.clone(),
        config.multi_scan_interval_secs,
        config.window_idle_secs,
    ));
    let scan_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut judged = 0usize;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match replay::parse_batch(&line) {
                    Ok(metrics) => {
                        judged += metrics.len();
                        publisher.publish(judger.judge(&metrics));
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping malformed input line"),
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    scan_handle.abort();
    let _ = scan_handle.await;
    scheduler.run_once();
    drop(scheduler);
    drop(publisher);
    writer.await?;

    tracing::info!(
        judged,
        current = judger.all_events().len(),
        "Replay finished"
    );
    Ok(())
}
