use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tmsync_core::{
    Config, Handlers, HttpTransport, ParseOptions, ParserRegistry, ReportFormat, ResultsUploader,
    SubmissionEngine, UploadError,
};

mod args;
mod progress;
mod prompt;

use args::{Cli, Commands};
use progress::BarReporter;
use prompt::prompt_for;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag.
    let default_level = if cli.global.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut config = cli
        .global
        .load_config()
        .wrap_err("Failed to load configuration")?;

    match cli.command {
        Commands::ParseJunit(args) => {
            args.apply(&mut config)?;
            upload_report(config, ReportFormat::JUnit, &args.file).await
        }
        Commands::ParseRobot(args) => {
            args.apply(&mut config)?;
            upload_report(config, ReportFormat::Robot, &args.file).await
        }
        Commands::ParseOpenapi(args) => {
            args.apply(&mut config)?;
            upload_report(config, ReportFormat::OpenApi, &args.file).await
        }
        Commands::ParseCucumber(args) => {
            args.apply(&mut config)?;
            upload_report(config, ReportFormat::Cucumber, &args.file).await
        }
        Commands::AddRun(args) => {
            args.apply(&mut config);
            add_run(config).await
        }
    }
}

async fn upload_report(config: Config, format: ReportFormat, pattern: &str) -> Result<ExitCode> {
    let options = ParseOptions::from_config(&config.upload);
    let mut suites = ParserRegistry::new()
        .parse(format, pattern, &options)
        .wrap_err_with(|| format!("Failed to parse {pattern}"))?;
    if suites.is_empty() {
        return Err(eyre!("No test suites found in {pattern}"));
    }

    let uploader = build_uploader(config)?;
    for suite in &mut suites {
        match uploader.upload(suite).await {
            Ok(report) => info!(
                run_id = report.run_id,
                cases_added = report.cases_added,
                cases_updated = report.cases_updated,
                results = report.results_added,
                "Upload of '{}' finished.",
                suite.name
            ),
            Err(e) => return Ok(failure(&e)),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn add_run(config: Config) -> Result<ExitCode> {
    let uploader = build_uploader(config)?;
    match uploader.add_run().await {
        Ok(run_id) => {
            println!("run_id: {run_id}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(failure(&e)),
    }
}

fn build_uploader(config: Config) -> Result<ResultsUploader> {
    config.validate()?;

    let transport = HttpTransport::from_config(&config.server)?;
    let handlers = Handlers::remote(Arc::new(transport), config.upload.verify);
    let prompt = prompt_for(config.upload.auto_response);

    Ok(ResultsUploader::new(config, handlers, prompt)
        .with_engine(SubmissionEngine::new().with_interrupt(interrupt_signal()))
        .with_progress(Arc::new(BarReporter::new())))
}

/// A flag that turns `true` on Ctrl-C.
fn interrupt_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling outstanding requests.");
            let _ = tx.send(true);
        }
    });
    rx
}

fn failure(e: &UploadError) -> ExitCode {
    // A rolled back upload already reported its cause and the rollback.
    if !matches!(e, UploadError::RolledBack { .. }) {
        error!("{e}");
    }
    ExitCode::FAILURE
}
