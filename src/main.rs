use clap::Parser;
use screenshot_batch::{setup_logging, BatchError, Cli, CliRunner, Config};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting screenshot-batch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let cli_runner = CliRunner::new(config, &args);

    // Interrupts are handled by the persister, which removes partial files
    // before exiting
    if let Err(e) = cli_runner.run(args.command).await {
        error!("{:#}", e);
        let code = e
            .downcast_ref::<BatchError>()
            .map(BatchError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }

    Ok(())
}

async fn load_config(args: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if let Some(config_path) = &args.config {
        // Load from file
        let config_content = tokio::fs::read_to_string(config_path).await?;
        serde_json::from_str(&config_content)?
    } else {
        // Use default configuration
        Config::default()
    };

    // Override with CLI arguments
    if let Some(timeout) = args.timeout {
        config.capture_timeout = Duration::from_secs(timeout);
    }

    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Capture timeout: {:?}", config.capture_timeout);
    info!("Resolution source: {}", config.resolution_source);

    Ok(config)
}
