use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "idcheck", about = "idcheck identity verification CLI")]
struct Cli {
    /// Base URL of the idcheckd daemon
    #[arg(long, env = "IDCHECK_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a document photo against a selfie
    Verify {
        /// Photo of the identity document
        #[arg(short, long)]
        document: PathBuf,
        /// Selfie of the person presenting the document
        #[arg(short, long)]
        selfie: PathBuf,
    },
    /// List recent verification attempts
    Attempts {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a single verification attempt
    Attempt {
        /// Attempt ID
        id: i64,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    let data = match &cli.command {
        Commands::Verify { document, selfie } => {
            let body = serde_json::json!({
                "document": encode_file(document)?,
                "selfie": encode_file(selfie)?,
            });
            tracing::debug!(document = %document.display(), selfie = %selfie.display(), "submitting verification");
            let response = client
                .post(format!("{base}/api/verify"))
                .json(&body)
                .send()
                .await
                .with_context(|| format!("cannot reach idcheckd at {base}"))?;
            unwrap_envelope(response.json().await?)?
        }
        Commands::Attempts { limit } => get(&client, &format!("{base}/api/attempts?limit={limit}")).await?,
        Commands::Attempt { id } => get(&client, &format!("{base}/api/attempts/{id}")).await?,
        Commands::Status => get(&client, &format!("{base}/api/status")).await?,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    match cli.command {
        Commands::Verify { .. } => {
            println!("{}", render_result(&data["result"]));
            println!("Recorded as attempt #{}", data["attempt"]["id"]);
        }
        Commands::Attempts { .. } => {
            let attempts = data["attempts"].as_array().cloned().unwrap_or_default();
            if attempts.is_empty() {
                println!("No verification attempts recorded");
            }
            for attempt in &attempts {
                println!("{}", render_attempt(attempt));
            }
        }
        Commands::Attempt { .. } => {
            println!("{}", render_attempt(&data));
            println!("  document: {}", data["document_path"].as_str().unwrap_or("-"));
            println!("  selfie:   {}", data["selfie_path"].as_str().unwrap_or("-"));
        }
        Commands::Status => {
            println!("idcheckd {}", data["version"].as_str().unwrap_or("?"));
            println!("  threshold: {}", data["threshold"]);
            println!(
                "  storage:   {} ({})",
                data["storage_backend"].as_str().unwrap_or("?"),
                data["container"].as_str().unwrap_or("?")
            );
        }
    }

    Ok(())
}

async fn get(client: &reqwest::Client, url: &str) -> Result<Value> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("cannot reach idcheckd at {url}"))?;
    unwrap_envelope(response.json().await?)
}

fn encode_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(STANDARD.encode(bytes))
}

/// Pull `data` out of the daemon's response envelope, or turn `error` into a failure.
fn unwrap_envelope(mut envelope: Value) -> Result<Value> {
    if envelope["success"].as_bool() == Some(true) {
        return Ok(envelope["data"].take());
    }
    let code = envelope["error"]["code"].as_str().unwrap_or("UNKNOWN");
    let message = envelope["error"]["message"].as_str().unwrap_or("request failed");
    bail!("{code}: {message}")
}

fn render_result(result: &Value) -> String {
    let verdict = if result["is_verified"].as_bool() == Some(true) {
        "VERIFIED"
    } else {
        "NOT VERIFIED"
    };
    format!("{verdict}: {}", result["message"].as_str().unwrap_or(""))
}

fn render_attempt(attempt: &Value) -> String {
    let verdict = if attempt["is_verified"].as_bool() == Some(true) {
        "verified"
    } else {
        "rejected"
    };
    let score = attempt["confidence_score"].as_f64().unwrap_or(0.0);
    format!(
        "#{:<6} {:<9} {:>7.2}%  {}",
        attempt["id"],
        verdict,
        score * 100.0,
        attempt["attempt_date"].as_str().unwrap_or("")
    )
}
