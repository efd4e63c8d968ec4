use anyhow::Context;
use subscription::{config, startup::Application, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::get_subscriber("subscription", "info", std::io::stdout);
    telemetry::init_subscriber(subscriber);

    let config = config::try_config().context("failed to load configuration.")?;
    let application = Application::build(config).await?;
    application
        .run_until_stopped()
        .await
        .context("http server stopped with an error.")?;

    tracing::info!("application stopped");
    Ok(())
}
