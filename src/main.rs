use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sustainability_compass::{
    config::{Config, LogFormat},
    AnalysisEngine, AnalysisRequest, ComparisonEngine, EngineCore, GeminiClient, Language,
    ModelSelector, ReportStore, SourceMetadata, SqliteStorage,
};

/// ESG/SDG analysis of sustainability reports
#[derive(Debug, Parser)]
#[command(name = "compass", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze an extracted report text file
    Analyze {
        /// UTF-8 text file produced by document extraction
        #[arg(short, long)]
        input: PathBuf,
        /// Output language (en or ar); detected from the text when omitted
        #[arg(short, long)]
        language: Option<Language>,
        /// Organization the report belongs to
        #[arg(long)]
        org: Option<String>,
        /// Reporting year; with --org, saves the result
        #[arg(long, requires = "org")]
        year: Option<i32>,
    },
    /// Compare stored reports of one organization across years
    Compare {
        #[arg(long)]
        org: String,
        /// Years to compare, e.g. 2022,2024
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        years: Vec<i32>,
    },
    /// List organizations, or the stored years of one organization
    List {
        #[arg(long)]
        org: Option<String>,
    },
    /// Delete one stored report
    Delete {
        #[arg(long)]
        org: String,
        #[arg(long)]
        year: i32,
    },
    /// List models the API key can use for generation
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Sustainability Compass starting..."
    );

    if let Err(e) = run(cli.command, config).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    let client = Arc::new(
        GeminiClient::new(&config.gemini, &config.request)
            .context("Failed to initialize Gemini client")?,
    );

    let storage = Arc::new(
        SqliteStorage::new(&config.database)
            .await
            .context("Failed to initialize database")?,
    );
    info!(path = %config.database.path.display(), "Database initialized");

    let selector = ModelSelector::new(
        config.models.clone(),
        client.clone(),
        config.request.clone(),
    )?;
    let core = EngineCore::new(selector, storage.clone());
    let cancel = cancel_on_ctrl_c();

    match command {
        Command::Analyze {
            input,
            language,
            org,
            year,
        } => {
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let language = language.unwrap_or_else(|| Language::detect(&text));

            let mut request = AnalysisRequest::new(text, language);
            if let Some(org) = &org {
                request = request.with_organization(org.clone());
            }

            let engine = AnalysisEngine::new(core, &config.analysis);
            match (org, year) {
                (Some(org), Some(year)) => {
                    let mut metadata = SourceMetadata::default();
                    if let Some(name) = input.file_name() {
                        metadata = metadata.with_file_name(name.to_string_lossy());
                    }
                    let report = engine
                        .analyze_and_save(&request, &org, year, metadata, &cancel)
                        .await?;
                    print_json(&report)?;
                }
                _ => {
                    let result = engine.analyze_request(&request, &cancel).await?;
                    print_json(&result)?;
                }
            }
        }
        Command::Compare { org, years } => {
            let engine = ComparisonEngine::new(core);
            let comparison = engine.compare_with_cancel(&org, &years, &cancel).await?;
            if comparison.narrative_failed() {
                warn!("Narrative unavailable; printing quantitative comparison only");
            }
            print_json(&comparison)?;
        }
        Command::List { org: Some(org) } => {
            print_json(&storage.list_years(&org).await?)?;
        }
        Command::List { org: None } => {
            print_json(&storage.list_organizations().await?)?;
        }
        Command::Delete { org, year } => {
            storage.delete(&org, year).await?;
            info!(organization = %org, year, "Report deleted");
        }
        Command::Models => {
            for model in client.list_models().await? {
                println!("{}", model);
            }
        }
    }

    Ok(())
}

/// Cancel in-flight model calls on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
