// Aucards - big, readable message cards
// Entry point and logging setup

use aucards::app::AppContext;
use aucards::cli::{self, Cli};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aucards=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let data_dir = cli.resolve_data_dir()?;

    tracing::info!("Starting Aucards with data directory {:?}", data_dir);

    let ctx = AppContext::open(&data_dir).await?;

    let mut stdout = std::io::stdout().lock();
    let result = cli::run(&ctx, cli.command, &mut stdout).await;

    ctx.close().await;
    result?;

    Ok(())
}
