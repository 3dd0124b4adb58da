//! Command line front end for the fnexec execution engine
//!
//! Runs single functions against the local Docker daemon, either on the warm
//! pool or in a fresh sandboxed container, and checks that the daemon and the
//! configured images are usable. Configuration comes from an optional YAML
//! file; without one the built-in defaults apply.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fnexec_core::{
    ConfigLoader, EngineConfig, ExecutionEngine, ExecutionError, ExecutionRequest,
    FunctionDefinition, Language,
};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about = "fnexec - Run functions in pooled or sandboxed containers")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, global = true, default_value = "fnexec.yaml", help = "Engine configuration file (defaults apply when missing)")]
    config: PathBuf,

    #[clap(long, short, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a source file
    Run {
        file: PathBuf,

        #[clap(long, help = "Language of the file, inferred from its extension when omitted")]
        language: Option<String>,

        #[clap(long, default_value_t = 5, help = "Timeout in seconds")]
        timeout: u64,

        #[clap(long, help = "Run in a fresh container under the sandbox runtime")]
        sandboxed: bool,
    },
    /// Execute a function definition file
    Invoke {
        definition: PathBuf,

        #[clap(long, help = "Run in a fresh container under the sandbox runtime")]
        sandboxed: bool,
    },
    /// Check the container runtime and the configured images
    Check,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    log::info!("Loading configuration from: {}", cli.config.display());
    let config = ConfigLoader::from_optional_file(&cli.config).await?;

    match cli.command {
        Commands::Run {
            file,
            language,
            timeout,
            sandboxed,
        } => {
            let request = request_from_file(&file, language.as_deref(), timeout).await?;
            run_request(config, request, sandboxed).await
        }
        Commands::Invoke {
            definition,
            sandboxed,
        } => {
            let definition = FunctionDefinition::from_file(&definition).await?;
            log::info!(
                "Invoking function '{}'{}",
                definition.name,
                definition
                    .route
                    .as_deref()
                    .map(|r| format!(" (route {})", r))
                    .unwrap_or_default()
            );
            let request = definition.to_request()?;
            run_request(config, request, sandboxed).await
        }
        Commands::Check => check(config).await,
    }
}

async fn request_from_file(
    file: &Path,
    language: Option<&str>,
    timeout: u64,
) -> Result<ExecutionRequest> {
    let code = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let language = match language {
        Some(name) => name.parse::<Language>()?,
        None => file
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Language::from_extension)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "cannot infer language of {}, pass --language",
                    file.display()
                )
            })?,
    };

    let request = ExecutionRequest::new(code, language, Duration::from_secs(timeout));
    request.validate()?;
    Ok(request)
}

async fn run_request(
    config: EngineConfig,
    request: ExecutionRequest,
    sandboxed: bool,
) -> Result<ExitCode> {
    let engine = ExecutionEngine::with_docker(config)?;

    // The sandboxed path never touches the pool.
    if !sandboxed {
        if let Err(e) = engine.startup().await {
            engine.shutdown().await;
            return Err(e.into());
        }
    }

    let strategy = engine.strategy(sandboxed);
    log::info!(
        "Executing {} code with the {} strategy (timeout {:?})",
        request.language(),
        strategy.name(),
        request.timeout()
    );
    let result = strategy.execute(&request).await;
    engine.shutdown().await;

    match result {
        Ok(output) => {
            print!("{}", output.stdout);
            if !output.stderr.is_empty() {
                eprint!("{}", output.stderr);
            }
            log::info!(
                "Finished in {:?} on container {}{}",
                output.duration,
                output.unit_id,
                if output.cold_start { " (cold start)" } else { "" }
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_failure(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_failure(error: &ExecutionError) {
    log::error!("Execution failed [{}]: {}", error.kind(), error);
    if let ExecutionError::ExecutionFailed { output, .. } = error {
        eprint!("{}", output);
    }
    eprintln!("error ({}): {}", error.status_code(), error);
}

async fn check(config: EngineConfig) -> Result<ExitCode> {
    let engine = ExecutionEngine::with_docker(config)?;
    let report = engine.check().await?;
    println!("Container runtime reachable.");

    let mut missing = 0;
    for (language, image, present) in report {
        println!(
            "  {:<12} {:<24} {}",
            language,
            image,
            if present { "ok" } else { "missing" }
        );
        if !present {
            missing += 1;
        }
    }

    if missing > 0 {
        println!("{} image(s) missing.", missing);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
