use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ember", about = "Ember — burn-after-reading secrets", version)]
struct Cli {
    /// Ember server URL (default: http://localhost:8080 or $EMBER_SERVER)
    #[arg(long, env = "EMBER_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Ember HTTP server
    Serve {
        /// Port to listen on (default: $EMBER_PORT or 8080)
        #[arg(long, env = "EMBER_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $EMBER_HOST or 0.0.0.0)
        #[arg(long, env = "EMBER_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Create a secret from text and/or a file, print the share URL
    Create {
        /// Secret text
        text: Option<String>,
        /// Attach a file
        #[arg(long)]
        file: Option<String>,
    },
    /// Preview a secret without consuming it
    Peek {
        /// Secret token
        token: String,
    },
    /// Consume a secret: print it one last time and schedule destruction
    Burn {
        /// Secret token
        token: String,
    },
    /// Print the shareable one-time URL for a token
    Share {
        /// Secret token
        token: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EMBER_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,
        Commands::Create { text, file } => cmd_create(&cli.server, text.as_deref(), file.as_deref()).await,
        Commands::Peek { token } => cmd_peek(&cli.server, &token).await,
        Commands::Burn { token } => cmd_burn(&cli.server, &token).await,
        Commands::Share { token } => {
            println!("{}", share_url(&cli.server, &token));
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = ember_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };
    ember_server::run(cfg).await
}

async fn cmd_create(server: &str, text: Option<&str>, file: Option<&str>) -> Result<()> {
    let (file_name, file_content) = match file {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("read file: {path}"))?;
            let name = std::path::Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .context("file path has no name component")?
                .to_owned();
            (Some(name), Some(BASE64.encode(bytes)))
        }
        None => (None, None),
    };

    if text.map(str::trim).unwrap_or_default().is_empty() && file_name.is_none() {
        anyhow::bail!("provide secret text, --file, or both");
    }

    let body = serde_json::json!({
        "text": text,
        "file_name": file_name,
        "file_content": file_content,
    });

    let client = Client::new();
    let resp = client
        .post(format!("{}/secrets", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("")
        );
    }

    let token = json["token"].as_str().context("missing token in response")?;
    println!("token: {token}");
    println!("share: {}", share_url(server, token));
    println!("The secret self-destructs after one view.");
    Ok(())
}

async fn cmd_peek(server: &str, token: &str) -> Result<()> {
    let json = fetch_secret(server, token).await?;
    print_payload(&json)?;
    println!();
    println!("Still unread. Run `ember burn {token}` to consume it.");
    Ok(())
}

async fn cmd_burn(server: &str, token: &str) -> Result<()> {
    // Fetch the payload before the destructive transition — once
    // consumed, the server never serves the content again.
    let json = fetch_secret(server, token).await?;

    let client = Client::new();
    let resp = client
        .post(format!(
            "{}/secrets/{}/view",
            server.trim_end_matches('/'),
            token
        ))
        .send()
        .await
        .context("HTTP request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!(
            "server returned {status}: {}",
            body["error"].as_str().unwrap_or("")
        );
    }

    print_payload(&json)?;
    println!();
    println!("✓ consumed — the secret is gone");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn share_url(server: &str, token: &str) -> String {
    format!("{}/secrets/{}", server.trim_end_matches('/'), token)
}

async fn fetch_secret(server: &str, token: &str) -> Result<Value> {
    let client = Client::new();
    let resp = client
        .get(share_url(server, token))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(json)
}

fn print_payload(json: &Value) -> Result<()> {
    let text = json["text"].as_str().unwrap_or("");
    if !text.is_empty() {
        println!("{text}");
    }

    if let (Some(name), Some(content)) = (json["file_name"].as_str(), json["file_content"].as_str())
    {
        // Strip any directory components the server might echo back.
        let name = std::path::Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment.bin");
        let bytes = BASE64.decode(content).context("decode file content")?;
        std::fs::write(name, &bytes).with_context(|| format!("write file: {name}"))?;
        println!("wrote attachment to {name} ({} bytes)", bytes.len());
    }
    Ok(())
}
