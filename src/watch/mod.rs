//! The two resource watch loops and everything they orchestrate.
//!
//! Each loop is single-consumer and processes events strictly in delivery
//! order; the loops share only the stateless backend client. Because the
//! reconciler re-fetches before every mutation, an ingress and a service
//! claiming the same hostname can still race across the loops; last write
//! wins at the backend. Known limitation, intentionally not locked away.

pub use error::Error;

mod error;
mod event;
mod handler;
mod hosts;
mod ingress;
mod service;
mod snapshot;

use anyhow::Result;
use kube::Client;
use tracing::info;

use crate::config::Config;
use crate::provider::{PiholeClient, RecordReconciler};
use ingress::IngressWatcher;
use service::ServiceWatcher;

/// Spawn both watch loops and run until one of them stops, which is fatal:
/// an external supervisor is expected to restart the process.
pub async fn run_watchers(client: Client, backend: PiholeClient, config: &Config) -> Result<()> {
    let ingress_watcher = IngressWatcher::new(
        client.clone(),
        RecordReconciler::new(backend.clone()),
        config.manage_all_ingress,
        config.ingress_external_ip,
    );
    let service_watcher = ServiceWatcher::new(client, RecordReconciler::new(backend));

    let ingress_task = tokio::spawn(ingress_watcher.run());
    let service_task = tokio::spawn(service_watcher.run());

    info!("watch loops started");

    tokio::select! {
        result = ingress_task => result??,
        result = service_task => result??,
    }

    Err(anyhow::anyhow!("a watch loop stopped unexpectedly"))
}
