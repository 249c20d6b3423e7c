use bybit_bot::cli::{App, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app = App::load(&cli.config, cli.testnet, cli.debug)?;

    // Guard keeps the file appender flushing until exit
    let _telemetry = bybit_bot::telemetry::init_telemetry(&app.config.telemetry)?;
    tracing::debug!(
        environment = app.environment(),
        config = %app.config_source,
        "Configuration loaded"
    );

    cli.command.execute(&app).await
}
