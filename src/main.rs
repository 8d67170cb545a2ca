use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use sproutly::cli::Cli;
use sproutly::logging::{init_logging, LogContext};
use sproutly::{log_info, Sproutly};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configuration errors abort before logging or scraping starts
    let config = cli.load_config().await?;
    init_logging(&config.logging)?;

    info!("Starting sproutly v{}", env!("CARGO_PKG_VERSION"));

    let app = Sproutly::new(config);
    let context = LogContext::new("main", "startup")
        .with_run_id(app.run_id())
        .with_string_field("base_url", app.config().scraping.base_url.clone())
        .with_string_field("output", app.config().export.output_file.display().to_string());
    log_info!(context, "Configuration loaded");

    match app.run().await {
        Ok(report) => {
            println!(
                "Extracted {} products ({} partial) from {} pages into {}",
                report.summary.products,
                report.summary.partial_products,
                report.summary.pages_scraped,
                report.export.file_path
            );
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            Err(e)
        }
    }
}
