//! BlogData CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use blogdata_core::config::LoggingConfig;
use commands::Cli;

/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(&config.logging);

    if let Err(e) = cli.execute(&config).await {
        eprintln!("Error: {e}");
        if let Some(ctx) = &e.context {
            eprintln!("  {ctx}");
        }
        std::process::exit(1);
    }
}
