//! herakles-proc-sampler - version 0.1.0
//!
//! Per-process resource usage sampler with tracing logging. This is the
//! scheduling shell around the sampler library: it drives one sampling
//! cycle per interval and writes the resulting records to stdout.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, Level};

use herakles_proc_sampler::cli::{Args, LogLevel};
use herakles_proc_sampler::config::{
    resolve_config, show_config, validate_effective_config, Config,
};
use herakles_proc_sampler::probe::LinuxProcfs;
use herakles_proc_sampler::stats::ProcStats;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    debug!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args).map_err(|e| anyhow::anyhow!("{e}"))?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Writes one JSON record per line (or pretty-printed blocks) to stdout.
fn emit_records(records: &[serde_json::Value], pretty: bool) {
    for record in records {
        let line = if pretty {
            serde_json::to_string_pretty(record)
        } else {
            serde_json::to_string(record)
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => error!("Failed to serialize record: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(&args);

    let config = load_validated_config(&args)?;

    if args.check_config {
        println!("Configuration OK");
        return Ok(());
    }
    if args.show_config {
        show_config(&config, args.config_format.clone()).map_err(|e| anyhow::anyhow!("{e}"))?;
        return Ok(());
    }

    let source = LinuxProcfs::new(&config.proc_root)
        .with_context(|| format!("failed to probe {}", config.proc_root.display()))?;
    info!(
        "Sampling processes under {} every {}s ({} name patterns)",
        config.proc_root.display(),
        config.interval_secs,
        config.procs.len()
    );

    let mut stats =
        ProcStats::new(&config, source).map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut cycles: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match stats.sample() {
                    Ok(records) => {
                        debug!("Cycle produced {} records", records.len());
                        emit_records(&records, args.pretty);
                    }
                    // The next interval is the retry; the previous snapshot
                    // is untouched after an aborted cycle.
                    Err(e) => error!("Sampling cycle failed: {}", e),
                }

                cycles += 1;
                if let Some(count) = args.count {
                    if cycles >= count {
                        info!("Completed {} sampling cycles, exiting", cycles);
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal, exiting");
                break;
            }
        }
    }

    Ok(())
}
