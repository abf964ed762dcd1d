use clap::Parser;
use riskpilot::cli::{Cli, Commands};
use riskpilot::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    riskpilot::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting paper engine");
            args.execute(config).await?;
        }
        Commands::Status => {
            println!("riskpilot status");
            println!("  Mode: {:?}", config.execution.mode);
            println!("  Status: Not running");
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Execution: {:?}", config.execution.mode);
            println!(
                "  Symbols: {}",
                config
                    .symbols
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                "  Risk: MaxPerTrade={}%, MaxExposure={}%",
                config.risk.max_risk_per_trade * rust_decimal_macros::dec!(100),
                config.risk.max_exposure_pct * rust_decimal_macros::dec!(100)
            );
            println!(
                "  Leverage: base={} range=[{}, {}]",
                config.leverage.base_leverage,
                config.leverage.min_leverage,
                config.leverage.max_leverage
            );
        }
    }

    Ok(())
}
