use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use query_gateway::api::{ApiConfig, Endpoint};
use query_gateway::backend::BackendRegistry;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Inspect query-gateway API documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a document and summarize it
    Check { file: PathBuf },
    /// Show which endpoint a target such as `GET/users/42` resolves to
    Match { file: PathBuf, target: String },
    /// Print the sanitized rendering served by the `api` action
    Dump { file: PathBuf },
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let registry = BackendRegistry::with_defaults();

    match cli.command {
        Commands::Check { file } => {
            let config = ApiConfig::load(&file, &registry)?;
            println!("{}: ok", file.display());
            println!("databases:");
            for name in config.database_names() {
                let kind = config.database(name).map(|db| db.kind()).unwrap_or("?");
                println!("  {name} ({kind})");
            }
            println!("routes:");
            for node in config.endpoints() {
                match &node.endpoint {
                    Endpoint::Special(action) => println!("  {} -> special:{action}", node.path),
                    Endpoint::Query(binding) => println!(
                        "  {} -> {} ({} params)",
                        node.path,
                        binding.database,
                        binding.parameters.len()
                    ),
                }
            }
        }
        Commands::Match { file, target } => {
            let config = ApiConfig::load(&file, &registry)?;
            let output = match config.match_target(&target) {
                Some((node, matched)) => json!({
                    "route": node.path,
                    "captures": matched.captures,
                    "endpoint": node.to_json(),
                }),
                None => json!({ "route": Value::Null }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Dump { file } => {
            let config = ApiConfig::load(&file, &registry)?;
            println!("{}", serde_json::to_string_pretty(config.sanitized())?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
