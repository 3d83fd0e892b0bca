use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "mesh-cli")]
#[command(about = "Management CLI for the service mesh admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mesh summary
    Status,
    /// System health; --check runs a sweep first
    Health {
        #[arg(long)]
        check: bool,
    },
    /// Configured services with endpoint and health
    Services,
    /// Circuit breaker states
    Breakers,
    /// Metrics for one service
    Metrics { service: String },
    /// Spans of one trace
    Trace { trace_id: String },
}

impl Commands {
    fn endpoint(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/admin/status".to_string()),
            Commands::Health { check: true } => (Method::POST, "/admin/health/check".to_string()),
            Commands::Health { check: false } => (Method::GET, "/admin/health".to_string()),
            Commands::Services => (Method::GET, "/admin/services".to_string()),
            Commands::Breakers => (Method::GET, "/admin/breakers".to_string()),
            Commands::Metrics { service } => (Method::GET, format!("/admin/metrics/{}", service)),
            Commands::Trace { trace_id } => (Method::GET, format!("/admin/traces/{}", trace_id)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = cli.command.endpoint();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
