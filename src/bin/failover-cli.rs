use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "failover-cli")]
#[command(about = "Management CLI for the provider failover service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    /// Admin API bearer token.
    #[arg(short, long, env = "FAILOVER_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,
    /// List breaker state and latency for every provider
    Providers,
    /// Show one provider
    Provider { id: String },
    /// Force a provider's circuit open or closed
    Force { id: String, state: TargetState },
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetState {
    Open,
    Closed,
}

impl TargetState {
    fn wire_name(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{base}/admin/status"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Providers => {
            client
                .get(format!("{base}/providers/health"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Provider { id } => {
            client
                .get(format!("{base}/providers/{id}/health"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Force { id, state } => {
            client
                .post(format!("{base}/providers/{id}/force-state"))
                .headers(headers)
                .json(&json!({ "state": state.wire_name() }))
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {status}");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
