mod config;
mod content;
mod error;
mod heuristics;
mod invoice;
mod invoice_store;
mod llm_extract;
mod pipeline;
mod sheet;

use clap::{Parser, Subcommand};
use error::PipelineError;
use invoice_store::InvoiceStore;
use llm_extract::StructuredExtractor;
use pipeline::Pipeline;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "invoice_ingest", about = "Extract invoice data and keep it in spreadsheet tables")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "invoice_ingest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract structured data from a PDF or image without saving it
    Upload { file: PathBuf },
    /// Extract and save in one step
    Process { file: PathBuf },
    /// Save an invoice record from a JSON file
    Save { json: PathBuf },
    /// List all stored invoice headers
    List,
    /// Write one invoice as a two-sheet spreadsheet
    Download {
        invoice_id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print the readiness payload
    Health,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // init tracing; logs go to stderr so stdout stays JSON
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let cli = Cli::parse();
    let cfg = config::Config::load_or_default(&cli.config)?;
    info!(data_dir = %cfg.data_dir, backend = ?cfg.llm.backend, "Configuration loaded");

    let pipeline = Pipeline::new(
        StructuredExtractor::from_config(&cfg.llm),
        InvoiceStore::new(&cfg.data_dir),
        &cfg.upload_dir,
    );

    match run(&pipeline, cli.command).await {
        Ok(code) => Ok(code),
        Err(e) => {
            error!(error = %e, status = e.status_code(), "Request failed");
            println!("{}", json!({ "error": e.user_message() }));
            Ok(if e.status_code() < 500 {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn run(pipeline: &Pipeline, command: Command) -> Result<ExitCode, PipelineError> {
    match command {
        Command::Upload { file } => {
            let record = pipeline.upload(&file).await?;
            println!(
                "{}",
                render(&json!({
                    "message": "Invoice processed successfully",
                    "data": record,
                }))?
            );
        }
        Command::Process { file } => {
            let (invoice_id, record) = pipeline.process(&file).await?;
            println!(
                "{}",
                render(&json!({
                    "message": "Invoice saved successfully",
                    "invoice_id": invoice_id,
                    "data": record,
                }))?
            );
        }
        Command::Save { json } => {
            let body = std::fs::read_to_string(&json)?;
            let invoice_id = pipeline.save_json(&body)?;
            println!(
                "{}",
                json!({ "message": "Invoice saved successfully", "invoice_id": invoice_id })
            );
        }
        Command::List => {
            let headers = pipeline.list()?;
            println!("{}", render(&headers)?);
        }
        Command::Download { invoice_id, out } => match pipeline.download(&invoice_id)? {
            Some(export) => {
                std::fs::create_dir_all(&out)?;
                let path = out.join(&export.filename);
                std::fs::write(&path, &export.bytes)?;
                println!("{}", json!({ "file": path.display().to_string() }));
            }
            None => {
                println!("{}", json!({ "error": "Invoice not found" }));
                return Ok(ExitCode::from(4));
            }
        },
        Command::Health => println!("{}", Pipeline::health()),
    }
    Ok(ExitCode::SUCCESS)
}

/// Pretty JSON for stdout; a failure here is ours, not the caller's.
fn render(value: &impl Serialize) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value).map_err(PipelineError::Output)
}
