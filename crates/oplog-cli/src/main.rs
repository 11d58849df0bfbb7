//! Oplog command-line tool.
//!
//! Appends records to a sled-backed oplog, resolves resume points, and tails
//! the log, printing records to stdout as they are appended.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod config;
mod error;
mod formatter;

use std::sync::Arc;

use clap::Parser;
use oplog_core::TailingStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Args, Command};
use error::CliError;
use formatter::{format_none, format_record};

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout carries only records.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oplog=info,oplog_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let format = args.format;

    match args.command {
        Command::Append(append) => {
            let log = commands::open_log(&args.data_path, true)?;
            let record = commands::append(&log, append)?;
            log.flush()?;
            println!("{}", format_record(&record, format));
        }

        Command::Latest { at_or_before } => {
            let log = commands::open_log(&args.data_path, false)?;
            match commands::latest(log, at_or_before).await? {
                Some(record) => println!("{}", format_record(&record, format)),
                None => println!("{}", format_none(format)),
            }
        }

        Command::Tail(tail) => {
            let options = tail.into_config();
            tracing::info!(
                data_path = %args.data_path.display(),
                resume = ?options.resume,
                max_iterations = ?options.max_iterations,
                batch_size = options.tail.batch_size,
                await_ms = options.tail.await_interval.as_millis() as u64,
                "starting tail"
            );

            let log = commands::open_log(&args.data_path, options.ingest_stdin)?;
            let stream = Arc::new(TailingStream::new(log.clone(), options.tail.clone())?);

            let ingest = options.ingest_stdin.then(|| {
                commands::spawn_ingest(log.clone(), tokio::io::BufReader::new(tokio::io::stdin()))
            });

            let stopper = stream.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for ctrl+c");
                    return;
                }
                tracing::info!("received shutdown signal");
                stopper.stop();
            });

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let summary = commands::tail(&stream, &options, format, &mut out).await?;
            tracing::info!(
                pulls = summary.pulls,
                delivered = summary.delivered,
                exit = ?summary.exit,
                "tail finished"
            );

            if let Some(task) = ingest {
                if let Some(appended) = commands::finish_ingest(task).await? {
                    tracing::debug!(appended, "ingest had already finished");
                }
            }
            log.flush()?;
        }
    }

    Ok(())
}
