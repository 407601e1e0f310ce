use anyhow::Result;
use chatrelay::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Multi-provider chat routing service", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,

    /// Print the model catalog
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Explicit path, then the per-user file, then built-in defaults
    let config_path = cli
        .config
        .or_else(|| Config::default_path().filter(|p| p.exists()));

    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Some(Commands::Serve) | None => {
            init_logging(&config.logging.level, &config.logging.format)?;
            match &config_path {
                Some(path) => tracing::info!("Config loaded from: {}", path.display()),
                None => tracing::info!("No config file found, using defaults"),
            }
            chatrelay::run(config).await?;
        }
        Some(Commands::Models) => {
            print_models(&config);
        }
    }

    Ok(())
}

fn print_models(config: &Config) {
    let router = chatrelay::Router::from_config(config);

    println!("{:<32} {:<14} {:>9}  FLAGS", "MODEL", "PROVIDER", "CONTEXT");
    for model in router.models() {
        let mut flags = Vec::new();
        if model.reasoning_capable {
            flags.push("reasoning");
        }
        if model.vision_capable {
            flags.push("vision");
        }
        if model.id == router.default_model() {
            flags.push("default");
        }
        println!(
            "{:<32} {:<14} {:>9}  {}",
            model.id,
            model.provider_kind.as_str(),
            model.context_window_tokens,
            flags.join(",")
        );
    }
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
        _ => {
            // Default to pretty
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
