//! s3probe: encrypted S3 multipart upload/download validator
//!
//! Commands:
//!   run --input <file>  - upload a file encrypted, download it back, verify
//!   config show         - display the effective configuration
//!   health              - check that the configured bucket is reachable

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use s3probe_core::config::ProbeConfig;
use s3probe_storage::{Backend, HttpTransport, MemoryStorage, ObjectStorage, S3Storage};
use s3probe_transfer::{run_validation, ProgressFn, ValidationOptions, PARTS_TARGET};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "s3probe",
    version,
    about = "Encrypted S3 multipart upload validator",
    long_about = "s3probe: encrypt a file, upload it as an S3 multipart upload, \
                  download it back in ranges and verify every checksum"
)]
struct Cli {
    /// Path to a TOML or YAML configuration file
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "S3PROBE_CONFIG",
        default_value = "s3probe.toml"
    )]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log: Option<String>,

    /// Log format (overrides the config file)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one upload/download validation
    Run {
        /// File to upload
        #[arg(long, short = 'i')]
        input: PathBuf,
        /// Part size in MiB (adjusted to S3 limits if needed)
        #[arg(long, short = 'p')]
        part_size: Option<u64>,
        /// Log every part instead of showing a progress bar
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Debug logging
        #[arg(long, short = 'd')]
        debug: bool,
        /// Create the bucket before uploading
        #[arg(long)]
        create_bucket: bool,
        /// Run against an in-memory backend instead of the configured endpoint
        #[arg(long)]
        dry_run: bool,
        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check storage reachability
    Health,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults + config file, secrets elided)
    Show,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let (verbose, debug) = match cli.command {
        Commands::Run { verbose, debug, .. } => (verbose, debug),
        _ => (true, false),
    };
    let format = cli.log_format.unwrap_or(if config.logging.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    let level = if debug {
        "debug".to_string()
    } else {
        cli.log.clone().unwrap_or_else(|| config.logging.level.clone())
    };
    init_logging(&level, format, verbose);

    match cli.command {
        Commands::Run {
            input,
            part_size,
            verbose,
            create_bucket,
            dry_run,
            json,
            ..
        } => {
            let args = RunArgs {
                input,
                part_size,
                verbose,
                create_bucket,
                dry_run,
                json,
            };
            cmd_run(config, &args).await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
        Commands::Health => cmd_health(&config).await,
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn init_logging(level: &str, format: LogFormat, verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let directives = if verbose {
        level.to_string()
    } else {
        format!("{level},{PARTS_TARGET}=off")
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ProbeConfig> {
    if path.exists() {
        ProbeConfig::from_path(path).with_context(|| format!("loading config: {}", path.display()))
    } else {
        Ok(ProbeConfig::default())
    }
}

fn build_backend(config: &ProbeConfig) -> Result<Backend> {
    let storage = S3Storage::new(&config.storage).context("building S3 storage")?;
    let transport = HttpTransport::new(config.storage.request_timeout_secs)
        .context("building HTTP transport")?;
    Ok(Backend::new(Arc::new(storage), Arc::new(transport)))
}

// ── `s3probe run` ─────────────────────────────────────────────────────────────

struct RunArgs {
    input: PathBuf,
    part_size: Option<u64>,
    verbose: bool,
    create_bucket: bool,
    dry_run: bool,
    json: bool,
}

async fn cmd_run(mut config: ProbeConfig, args: &RunArgs) -> Result<()> {
    if let Some(mib) = args.part_size {
        config.transfer.part_size_mib = mib;
    }
    config.validate().context("invalid configuration")?;

    let mut opts = ValidationOptions::from_config(&config, &args.input);
    opts.create_bucket = args.create_bucket || args.dry_run;

    let backend = if args.dry_run {
        tracing::info!("dry run: using the in-memory backend");
        MemoryStorage::backend(&Arc::new(MemoryStorage::new()))
    } else {
        build_backend(&config)?
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let pb = if args.verbose {
        None
    } else {
        Some(make_progress_bar()?)
    };
    let progress: Option<ProgressFn> = pb.clone().map(|pb| {
        Box::new(move |done: u64, total: u64, phase: &str| {
            pb.set_prefix(phase.to_string());
            pb.set_length(total);
            pb.set_position(done);
            pb.set_message(format!("{} / {}", fmt_bytes(done), fmt_bytes(total)));
        }) as ProgressFn
    });

    let result = run_validation(&backend, &opts, &cancel, progress.as_ref()).await;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let summary = result.with_context(|| format!("validating {}", args.input.display()))?;

    summary.log();
    if args.json {
        let rendered = summary.to_json().context("serializing summary")?;
        println!("{rendered}");
    }
    Ok(())
}

// ── `s3probe config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &ProbeConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `s3probe health` ──────────────────────────────────────────────────────────

async fn cmd_health(config: &ProbeConfig) -> Result<()> {
    let storage = S3Storage::new(&config.storage).context("building S3 storage")?;
    storage
        .check_health(&config.storage.bucket)
        .await
        .with_context(|| {
            format!(
                "bucket {} at {} is not reachable",
                config.storage.bucket, config.storage.endpoint
            )
        })?;
    println!(
        "storage: {} [{}] ok",
        config.storage.endpoint, config.storage.bucket
    );
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn make_progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {percent}% {msg}")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn fmt_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "s3probe",
            "run",
            "--input",
            "data.bin",
            "--part-size",
            "32",
            "-v",
            "--dry-run",
            "--config",
            "probe.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("probe.yaml"));
        match cli.command {
            Commands::Run {
                input,
                part_size,
                verbose,
                dry_run,
                json,
                ..
            } => {
                assert_eq!(input, PathBuf::from("data.bin"));
                assert_eq!(part_size, Some(32));
                assert!(verbose);
                assert!(dry_run);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_requires_input() {
        assert!(Cli::try_parse_from(["s3probe", "run"]).is_err());
    }

    #[test]
    fn fmt_bytes_units() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KiB");
        assert_eq!(fmt_bytes(16 * 1024 * 1024), "16.0 MiB");
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/s3probe.toml")).unwrap();
        assert_eq!(config.transfer.part_size_mib, 16);
    }
}
