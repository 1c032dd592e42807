use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use futures_channel::mpsc;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::runtime::watcher;
use kube::{Api, Client};
use tap::TapFallible;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::provider::{DnsBackend, RecordReconciler};
use crate::watch::error::Error;
use crate::watch::event::{lifecycle_events, LifecycleEvent};
use crate::watch::handler;
use crate::watch::snapshot::ResourceSnapshot;

const POLL_ATTEMPTS: u32 = 10;

/// Single-consumer event loop for load balancer services. A service carries
/// exactly one hostname, the domain annotation's value.
pub struct ServiceWatcher<B> {
    client: Client,
    reconciler: RecordReconciler<B>,
}

impl<B> ServiceWatcher<B> {
    pub fn new(client: Client, reconciler: RecordReconciler<B>) -> Self {
        Self { client, reconciler }
    }
}

impl<B: DnsBackend + Send + Sync + 'static> ServiceWatcher<B> {
    pub async fn run(self) -> Result<()> {
        info!("starting service watcher");

        let api: Api<Service> = Api::all(self.client.clone());

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
            let event = event.tap_err(|err| error!(%err, "service watch stream failed"))?;

            if let Err(err) = self.handle_event(event).await {
                error!(%err, "handle service event failed");
            }
        }

        error!("service watch stream is dry, that should not happen");

        Err(anyhow::anyhow!("service watch stream is dry"))
    }

    async fn handle_event(&self, event: LifecycleEvent<Service>) -> Result<(), Error> {
        match event {
            LifecycleEvent::Added(service) => {
                let snapshot = ResourceSnapshot::from_service(&service);
                if !snapshot.managed {
                    debug!(service = %snapshot.name, "service is not managed, skip");

                    return Ok(());
                }

                info!(
                    service = %snapshot.name,
                    hosts = ?snapshot.hostnames,
                    "adding service domain with annotation"
                );

                let ip = self.resolve_ip(&snapshot).await?;

                handler::apply_added(&self.reconciler, &snapshot, ip).await
            }

            LifecycleEvent::Deleted(service) => {
                let snapshot = ResourceSnapshot::from_service(&service);
                if !snapshot.managed {
                    debug!(service = %snapshot.name, "service is not managed, skip");

                    return Ok(());
                }

                info!(
                    service = %snapshot.name,
                    hosts = ?snapshot.hostnames,
                    "deleting service domain with annotation"
                );

                let ip = snapshot.single_lb_ip()?;

                handler::apply_deleted(&self.reconciler, &snapshot, ip).await
            }

            LifecycleEvent::Updated { old, new } => {
                if !is_load_balancer(&new) {
                    warn!(
                        service = %new.metadata.name.as_deref().unwrap_or_default(),
                        "service is not of type LoadBalancer, ignored"
                    );

                    return Ok(());
                }

                let old_snapshot = ResourceSnapshot::from_service(&old);
                let new_snapshot = ResourceSnapshot::from_service(&new);

                self.handle_update(old_snapshot, new_snapshot).await
            }
        }
    }

    #[instrument(err, skip(self, old, new), fields(service = %new.name))]
    async fn handle_update(
        &self,
        old: ResourceSnapshot,
        new: ResourceSnapshot,
    ) -> Result<(), Error> {
        // the pending address just got assigned, the Added event covers that
        if handler::pending_address_assigned(&old, &new) {
            debug!(service = %new.name, "load balancer address skip condition");

            return Ok(());
        }

        handler::dispatch_update(&self.reconciler, &old, &new, new.single_lb_ip(), None).await
    }

    /// Poll the live service status until an external address is assigned.
    async fn resolve_ip(&self, snapshot: &ResourceSnapshot) -> Result<IpAddr, Error> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &snapshot.namespace);

        for attempt in 1..=POLL_ATTEMPTS {
            let service = api.get(&snapshot.name).await?;
            let live = ResourceSnapshot::from_service(&service);

            if live.has_lb_address() {
                return live.single_lb_ip();
            }

            debug!(
                service = %snapshot.name,
                attempt,
                "service has no load balancer address yet"
            );

            if attempt < POLL_ATTEMPTS {
                time::sleep(Duration::from_secs(1 << attempt)).await;
            }
        }

        Err(Error::NoLoadBalancerIp)
    }
}

fn is_load_balancer(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_ref())
        .map(|type_| type_ == "LoadBalancer")
        .unwrap_or(false)
}
