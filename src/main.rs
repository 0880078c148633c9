use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use subst_xml::{
    Cli, ConfigManager, FileDiscovery, FileReport, LogLevel, Output, OutputFormat,
    ProcessingConfig, ProgressCallback, VerbosityLevel, XmlProcessor,
};

/// Parse arguments; usage errors exit with status 1, help and version with 0
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Diagnostics go to stderr; RUST_LOG wins over the configured level
fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_cli();

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;
    init_tracing(config.output.log_level);
    debug!(?config, "Configuration loaded");

    let processing = ProcessingConfig::try_from(&config)?;
    let dry_run = processing.dry_run();

    let discovery = FileDiscovery::new()
        .with_extensions(config.files.extensions.clone())
        .with_include_patterns(config.files.include_patterns.clone())?
        .with_exclude_patterns(config.files.exclude_patterns.clone())?
        .with_follow_symlinks(config.files.follow_symlinks);
    let processor = XmlProcessor::new(processing).with_discovery(discovery);

    let verbosity = if config.output.quiet {
        VerbosityLevel::Quiet
    } else if config.output.verbose {
        VerbosityLevel::Verbose
    } else {
        VerbosityLevel::Normal
    };
    let output = Arc::new(Output::new(verbosity));

    let progress: Option<ProgressCallback> = match config.output.format {
        OutputFormat::Human => {
            let output = Arc::clone(&output);
            Some(Arc::new(move |report: &FileReport| {
                if let Some(line) = output.format_file_report(report) {
                    println!("{}", line);
                }
            }))
        }
        OutputFormat::Json => None,
    };

    let results = processor
        .run_with_progress(&cli.path, progress)
        .await
        .with_context(|| format!("Failed to process {}", cli.path.display()))?;

    match config.output.format {
        OutputFormat::Human => print!("{}", output.format_summary(&results.summary, dry_run)),
        OutputFormat::Json => println!("{}", output.format_json(&results.summary)?),
    }
    debug!(elapsed = ?results.total_duration, "Done");

    Ok(())
}
