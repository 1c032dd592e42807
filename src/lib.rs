use anyhow::Result;
use tracing::info;

mod config;
mod provider;
mod trace;
mod watch;

pub async fn run() -> Result<()> {
    trace::init_tracing()?;

    let config = config::Config::from_env()?;

    info!(?config, "loaded configuration");

    let backend = provider::PiholeClient::new(config.insecure, &config.address, &config.token)?;

    // startup is fatal when the backend never answers within the probe budget
    backend.wait_until_reachable().await?;

    let client = kube::Client::try_default().await?;

    info!("init k8s client");

    watch::run_watchers(client, backend, &config).await?;

    trace::stop_tracing();

    Ok(())
}
