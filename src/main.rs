pub mod config;
pub mod host;
pub mod interact;
pub mod server;
pub mod source;
pub mod style;
pub mod types;

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the map application
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Load every configured layer and report feature counts and style buckets
    Inspect {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let host = host::MapHost::mount(app_config);
            server::start_server(host).await?;
        }
        Commands::Inspect { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            inspect(&app_config).await?;
        }
    }

    Ok(())
}

async fn inspect(config: &config::AppConfig) -> anyhow::Result<()> {
    let mut failures = 0;
    for layer in &config.layers {
        match source::load_layer(layer, &config.viewport).await {
            Ok(features) => {
                let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
                for feature in &features {
                    let spec = layer.style.style(feature);
                    *buckets.entry(spec.fill).or_default() += 1;
                }
                println!("{}: {} features", layer.name, features.len());
                for (fill, count) in buckets {
                    println!("  {}: {}", fill, count);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: failed to load: {:#}", layer.name, e);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{} layer(s) failed to load", failures);
    }
    Ok(())
}
