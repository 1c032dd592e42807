use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use futures_channel::mpsc;
use futures_util::StreamExt;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ListParams;
use kube::runtime::watcher;
use kube::{Api, Client};
use tap::TapFallible;
use tokio::time;
use tracing::{debug, error, info, instrument};

use crate::provider::{DnsBackend, RecordReconciler};
use crate::watch::error::Error;
use crate::watch::event::{lifecycle_events, LifecycleEvent};
use crate::watch::handler;
use crate::watch::snapshot::ResourceSnapshot;

const POLL_ATTEMPTS: u32 = 8;

/// Single-consumer event loop for ingress resources.
pub struct IngressWatcher<B> {
    client: Client,
    reconciler: RecordReconciler<B>,
    manage_all: bool,
    external_ip: Option<IpAddr>,
}

impl<B> IngressWatcher<B> {
    pub fn new(
        client: Client,
        reconciler: RecordReconciler<B>,
        manage_all: bool,
        external_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            client,
            reconciler,
            manage_all,
            external_ip,
        }
    }
}

impl<B: DnsBackend + Send + Sync + 'static> IngressWatcher<B> {
    pub async fn run(self) -> Result<()> {
        info!("starting ingress watcher");

        if self.manage_all {
            info!("externalizing all ingress objects");
        } else {
            info!("only externalizing ingress objects with the opt-in annotation");
        }

        if let Some(ip) = self.external_ip {
            info!(%ip, "externalized ingress hosts will use the static ip");
        }

        let api: Api<Ingress> = Api::all(self.client.clone());

        let (sender, mut receiver) = mpsc::unbounded();

        tokio::spawn(async move {
            let events = lifecycle_events(watcher(api, ListParams::default()));
            futures_util::pin_mut!(events);

            while let Some(event) = events.next().await {
                if sender.unbounded_send(event).is_err() {
                    return;
                }
            }
        });

        while let Some(event) = receiver.next().await {
            let event = event.tap_err(|err| error!(%err, "ingress watch stream failed"))?;

            // a terminal per-event error leaves the affected hostnames in
            // their pre-event state, the loop itself keeps running
            if let Err(err) = self.handle_event(event).await {
                error!(%err, "handle ingress event failed");
            }
        }

        error!("ingress watch stream is dry, that should not happen");

        Err(anyhow::anyhow!("ingress watch stream is dry"))
    }

    async fn handle_event(&self, event: LifecycleEvent<Ingress>) -> Result<(), Error> {
        match event {
            LifecycleEvent::Added(ingress) => {
                let snapshot = ResourceSnapshot::from_ingress(&ingress, self.manage_all);
                if !snapshot.managed {
                    debug!(ingress = %snapshot.name, "ingress is not managed, skip");

                    return Ok(());
                }

                info!(ingress = %snapshot.name, hosts = ?snapshot.hostnames, "adding ingress domains");

                let ip = self.resolve_ip(&snapshot).await?;

                handler::apply_added(&self.reconciler, &snapshot, ip).await
            }

            LifecycleEvent::Deleted(ingress) => {
                let snapshot = ResourceSnapshot::from_ingress(&ingress, self.manage_all);
                if !snapshot.managed {
                    debug!(ingress = %snapshot.name, "ingress is not managed, skip");

                    return Ok(());
                }

                info!(ingress = %snapshot.name, hosts = ?snapshot.hostnames, "deleting ingress domains");

                // the resource is gone, use its last-known address
                let ip = match self.external_ip {
                    Some(ip) => ip,
                    None => snapshot.single_lb_ip()?,
                };

                handler::apply_deleted(&self.reconciler, &snapshot, ip).await
            }

            LifecycleEvent::Updated { old, new } => {
                let old_snapshot = ResourceSnapshot::from_ingress(&old, self.manage_all);
                let new_snapshot = ResourceSnapshot::from_ingress(&new, self.manage_all);

                self.handle_update(old_snapshot, new_snapshot).await
            }
        }
    }

    #[instrument(err, skip(self, old, new), fields(ingress = %new.name))]
    async fn handle_update(
        &self,
        old: ResourceSnapshot,
        new: ResourceSnapshot,
    ) -> Result<(), Error> {
        // polling is only worth doing when the new observation is managed
        let new_ip = if new.managed {
            self.resolve_ip(&new).await
        } else {
            Err(Error::NoLoadBalancerIp)
        };

        handler::dispatch_update(&self.reconciler, &old, &new, new_ip, self.external_ip).await
    }

    /// Poll the live ingress status until an external address shows up, the
    /// static override bypasses polling entirely.
    async fn resolve_ip(&self, snapshot: &ResourceSnapshot) -> Result<IpAddr, Error> {
        if let Some(ip) = self.external_ip {
            return Ok(ip);
        }

        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &snapshot.namespace);

        for attempt in 1..=POLL_ATTEMPTS {
            let ingress = api.get(&snapshot.name).await?;
            let live = ResourceSnapshot::from_ingress(&ingress, self.manage_all);

            if live.has_lb_address() {
                return live.single_lb_ip();
            }

            debug!(
                ingress = %snapshot.name,
                attempt,
                "ingress has no load balancer address yet"
            );

            if attempt < POLL_ATTEMPTS {
                time::sleep(Duration::from_secs(1 << attempt)).await;
            }
        }

        Err(Error::NoLoadBalancerIp)
    }
}
