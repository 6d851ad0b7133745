use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "slipcover-cli")]
#[command(about = "Client for the slipcover gateway", long_about = None)]
struct Cli {
    /// Gateway base URL
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Session key sent as `Token session:<key>`
    #[arg(short, long, env = "SLIPCOVER_SESSION")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the gateway to shut down (admin session required)
    Shutdown,
    /// Create a session for an email address
    CreateSession {
        #[arg(long)]
        email: String,
    },
    /// Read a session; defaults to the one behind --token
    GetSession {
        #[arg(long)]
        id: Option<String>,
    },
    /// Confirm a session with the secret from its confirmation record
    Confirm {
        #[arg(long)]
        id: String,
        #[arg(long)]
        secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token session:{token}"))?,
        );
    }

    let res = match cli.command {
        Commands::Shutdown => {
            client
                .post(format!("{base}/admin"))
                .headers(headers)
                .json(&json!({ "opcode": "shutdown" }))
                .send()
                .await?
        }
        Commands::CreateSession { email } => {
            client
                .put(format!("{base}/session"))
                .json(&json!({ "email": email }))
                .send()
                .await?
        }
        Commands::GetSession { id } => {
            let url = match id {
                Some(id) => format!("{base}/session/{id}"),
                None => format!("{base}/session"),
            };
            client.get(url).headers(headers).send().await?
        }
        Commands::Confirm { id, secret } => {
            client
                .get(format!("{base}/confirm/{id}"))
                .query(&[("secret", secret)])
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
