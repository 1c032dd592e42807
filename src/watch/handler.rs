use std::net::IpAddr;

use tracing::{debug, info, instrument};

use crate::provider::{self, ChangeSet, DnsBackend, RecordReconciler};
use crate::watch::error::Error;
use crate::watch::hosts::{diff, same_hosts};
use crate::watch::snapshot::ResourceSnapshot;

fn add_record(ip: IpAddr, hostname: &str) -> Result<ChangeSet, provider::Error> {
    ChangeSet::create(&ip.to_string(), hostname, "add")
}

fn delete_record(ip: IpAddr, hostname: &str) -> Result<ChangeSet, provider::Error> {
    ChangeSet::create(&ip.to_string(), hostname, "delete")
}

/// A managed resource appeared: publish every desired hostname at the
/// resolved address. Fail fast, remaining hostnames are left for the next
/// event.
#[instrument(err, skip(reconciler, snapshot), fields(resource = %snapshot.name))]
pub async fn apply_added<B: DnsBackend + Sync>(
    reconciler: &RecordReconciler<B>,
    snapshot: &ResourceSnapshot,
    ip: IpAddr,
) -> Result<(), Error> {
    for hostname in &snapshot.hostnames {
        reconciler.add(&add_record(ip, hostname)?).await?;

        info!(resource = %snapshot.name, domain = %hostname, "completed record creation");
    }

    Ok(())
}

/// A managed resource went away: withdraw its hostnames. A record that is
/// already absent matches the intent, so that case is not an error here.
#[instrument(err, skip(reconciler, snapshot), fields(resource = %snapshot.name))]
pub async fn apply_deleted<B: DnsBackend + Sync>(
    reconciler: &RecordReconciler<B>,
    snapshot: &ResourceSnapshot,
    ip: IpAddr,
) -> Result<(), Error> {
    for hostname in &snapshot.hostnames {
        match reconciler.delete(&delete_record(ip, hostname)?).await {
            Err(provider::Error::RecordNotFound(_)) => {
                debug!(resource = %snapshot.name, domain = %hostname, "record already absent");
            }

            result => {
                result?;

                info!(resource = %snapshot.name, domain = %hostname, "completed record deletion");
            }
        }
    }

    Ok(())
}

/// A resource dropped its opt-in annotation: stop managing its records.
#[instrument(err, skip(reconciler, snapshot), fields(resource = %snapshot.name))]
pub async fn apply_unmanaged<B: DnsBackend + Sync>(
    reconciler: &RecordReconciler<B>,
    snapshot: &ResourceSnapshot,
    ip: IpAddr,
) -> Result<(), Error> {
    for hostname in &snapshot.hostnames {
        reconciler.delete(&delete_record(ip, hostname)?).await?;
    }

    info!(resource = %snapshot.name, "resource no longer managed, records removed");

    Ok(())
}

/// Reconcile an observed update from the `(old, new)` snapshot pair.
///
/// Genuinely new and removed hostnames are handled before any re-point of
/// unchanged ones, so a failure in the re-point phase cannot block host-set
/// changes that are independent of the address migration.
#[instrument(err, skip(reconciler, old, new), fields(resource = %new.name))]
pub async fn apply_updated<B: DnsBackend + Sync>(
    reconciler: &RecordReconciler<B>,
    old: &ResourceSnapshot,
    new: &ResourceSnapshot,
    ip: IpAddr,
    same_ip: bool,
) -> Result<(), Error> {
    if same_hosts(&old.hostnames, &new.hostnames) && same_ip {
        debug!(resource = %new.name, "resource updated but nothing to do");

        return Ok(());
    }

    let (added, removed, both) = diff(&old.hostnames, &new.hostnames);

    for hostname in &added {
        reconciler.add(&add_record(ip, hostname)?).await?;

        info!(resource = %new.name, domain = %hostname, "completed record creation");
    }

    for hostname in &removed {
        reconciler.delete(&delete_record(ip, hostname)?).await?;

        info!(resource = %new.name, domain = %hostname, "completed record deletion");
    }

    // unchanged hostnames only need touching when the address moved
    if !same_ip {
        for hostname in &both {
            reconciler.delete(&delete_record(ip, hostname)?).await?;
            reconciler.add(&add_record(ip, hostname)?).await?;

            info!(resource = %new.name, domain = %hostname, "re-pointed record");
        }
    }

    Ok(())
}

/// A load balancer assigning the long-awaited address produces an update
/// whose hostnames the preceding resource event already published.
pub fn pending_address_assigned(old: &ResourceSnapshot, new: &ResourceSnapshot) -> bool {
    same_hosts(&old.hostnames, &new.hostnames) && !old.has_lb_address() && new.has_lb_address()
}

/// Dispatch an update on the managed-state transition of its snapshot pair.
///
/// `new_ip` is resolved by the caller, since resolution may involve polling
/// the live resource; it is only inspected on transitions where the new
/// snapshot is managed. `override_ip` pins every address, which makes a
/// re-point impossible.
#[instrument(err, skip(reconciler, old, new, new_ip), fields(resource = %new.name))]
pub async fn dispatch_update<B: DnsBackend + Sync>(
    reconciler: &RecordReconciler<B>,
    old: &ResourceSnapshot,
    new: &ResourceSnapshot,
    new_ip: Result<IpAddr, Error>,
    override_ip: Option<IpAddr>,
) -> Result<(), Error> {
    // the address the old snapshot's records live at
    let old_ip = || match override_ip {
        Some(ip) => Ok(ip),
        None => old.single_lb_ip(),
    };

    match (old.managed, new.managed) {
        (false, false) => {
            debug!(resource = %new.name, "resource is not managed, skip");

            Ok(())
        }

        // the annotation was dropped, withdraw everything it published
        (true, false) => apply_unmanaged(reconciler, old, old_ip()?).await,

        (false, true) => apply_added(reconciler, new, new_ip?).await,

        (true, true) => {
            let new_ip = new_ip?;
            let same_ip = match override_ip {
                Some(_) => true,
                None => old_ip()? == new_ip,
            };

            apply_updated(reconciler, old, new, new_ip, same_ip).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::{Action, HostRecord};

    #[derive(Clone, Default)]
    struct FakeBackend {
        records: Arc<Mutex<Vec<HostRecord>>>,
        mutations: Arc<Mutex<Vec<ChangeSet>>>,
    }

    impl FakeBackend {
        fn with_records(records: &[(&str, &str)]) -> Self {
            let backend = Self::default();
            for (hostname, ip) in records {
                backend.records.lock().unwrap().push(HostRecord {
                    hostname: hostname.to_string(),
                    ip: ip.parse().unwrap(),
                });
            }

            backend
        }

        fn mutations(&self) -> Vec<ChangeSet> {
            self.mutations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DnsBackend for FakeBackend {
        async fn list_records(&self) -> Result<Vec<HostRecord>, provider::Error> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn apply_change(&self, change_set: &ChangeSet) -> Result<(), provider::Error> {
            self.mutations.lock().unwrap().push(change_set.clone());

            let mut records = self.records.lock().unwrap();
            match change_set.action {
                Action::Add => records.push(change_set.record.clone()),
                Action::Delete => {
                    records.retain(|record| record.hostname != change_set.record.hostname)
                }
            }

            Ok(())
        }
    }

    fn snapshot_at(hosts: &[&str], managed: bool, lb: &[&str]) -> ResourceSnapshot {
        ResourceSnapshot {
            name: "web".to_string(),
            namespace: "default".to_string(),
            hostnames: hosts.iter().map(|host| host.to_string()).collect(),
            managed,
            lb_addresses: lb.iter().map(|addr| addr.to_string()).collect(),
        }
    }

    fn snapshot(hosts: &[&str]) -> ResourceSnapshot {
        snapshot_at(hosts, true, &["10.1.1.1"])
    }

    fn ip() -> IpAddr {
        "10.1.1.1".parse().unwrap()
    }

    #[tokio::test]
    async fn update_swaps_hostname_without_repoint() {
        let backend = FakeBackend::with_records(&[("a.example.com", "10.1.1.1")]);
        let reconciler = RecordReconciler::new(backend.clone());

        apply_updated(
            &reconciler,
            &snapshot(&["a.example.com"]),
            &snapshot(&["b.example.com"]),
            ip(),
            true,
        )
        .await
        .unwrap();

        let mutations = backend.mutations();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0].action, Action::Add);
        assert_eq!(mutations[0].record.hostname, "b.example.com");
        assert_eq!(mutations[1].action, Action::Delete);
        assert_eq!(mutations[1].record.hostname, "a.example.com");
    }

    #[tokio::test]
    async fn update_with_nothing_changed_is_a_no_op() {
        let backend = FakeBackend::with_records(&[("a.example.com", "10.1.1.1")]);
        let reconciler = RecordReconciler::new(backend.clone());

        apply_updated(
            &reconciler,
            &snapshot(&["a.example.com"]),
            &snapshot(&["a.example.com"]),
            ip(),
            true,
        )
        .await
        .unwrap();

        assert!(backend.mutations().is_empty());
    }

    #[tokio::test]
    async fn update_repoints_unchanged_hosts_when_ip_moved() {
        let backend = FakeBackend::with_records(&[("a.example.com", "10.1.1.1")]);
        let reconciler = RecordReconciler::new(backend.clone());

        let new_ip: IpAddr = "10.2.2.2".parse().unwrap();

        apply_updated(
            &reconciler,
            &snapshot(&["a.example.com"]),
            &snapshot(&["a.example.com"]),
            new_ip,
            false,
        )
        .await
        .unwrap();

        let mutations = backend.mutations();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0].action, Action::Delete);
        assert_eq!(mutations[1].action, Action::Add);
        assert_eq!(mutations[1].record.ip, new_ip);
    }

    #[tokio::test]
    async fn added_publishes_every_hostname() {
        let backend = FakeBackend::default();
        let reconciler = RecordReconciler::new(backend.clone());

        apply_added(&reconciler, &snapshot(&["a.example.com", "b.example.com"]), ip())
            .await
            .unwrap();

        assert_eq!(backend.mutations().len(), 2);
        assert_eq!(backend.records.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleted_swallows_absent_records() {
        let backend = FakeBackend::with_records(&[("a.example.com", "10.1.1.1")]);
        let reconciler = RecordReconciler::new(backend.clone());

        apply_deleted(
            &reconciler,
            &snapshot(&["a.example.com", "gone.example.com"]),
            ip(),
        )
        .await
        .unwrap();

        // only the existing record produced a mutating call
        assert_eq!(backend.mutations().len(), 1);
        assert!(backend.records.lock().unwrap().is_empty());
    }

    #[test]
    fn pending_address_assignment_is_detected() {
        let pending = snapshot_at(&["a.example.com"], true, &[]);
        let assigned = snapshot_at(&["a.example.com"], true, &["10.1.1.1"]);

        assert!(pending_address_assigned(&pending, &assigned));

        // address was already there
        assert!(!pending_address_assigned(&assigned, &assigned));

        // host set changed along the way
        let renamed = snapshot_at(&["b.example.com"], true, &["10.1.1.1"]);
        assert!(!pending_address_assigned(&pending, &renamed));
    }

    #[tokio::test]
    async fn dispatch_unmanage_deletes_at_old_address() {
        let backend = FakeBackend::with_records(&[("a.example.com", "10.1.1.1")]);
        let reconciler = RecordReconciler::new(backend.clone());

        let old = snapshot(&["a.example.com"]);
        let new = snapshot_at(&["a.example.com"], false, &["10.1.1.1"]);

        dispatch_update(&reconciler, &old, &new, Err(Error::NoLoadBalancerIp), None)
            .await
            .unwrap();

        let mutations = backend.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].action, Action::Delete);
        assert_eq!(mutations[0].record.ip, ip());
    }

    #[tokio::test]
    async fn dispatch_newly_managed_adds_at_new_address() {
        let backend = FakeBackend::default();
        let reconciler = RecordReconciler::new(backend.clone());

        // the old observation has no address at all, it must not be consulted
        let old = snapshot_at(&["a.example.com"], false, &[]);
        let new = snapshot_at(&["a.example.com"], true, &["10.2.2.2"]);
        let new_ip: IpAddr = "10.2.2.2".parse().unwrap();

        dispatch_update(&reconciler, &old, &new, Ok(new_ip), None)
            .await
            .unwrap();

        let mutations = backend.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].action, Action::Add);
        assert_eq!(mutations[0].record.ip, new_ip);
    }

    #[tokio::test]
    async fn dispatch_override_forces_no_repoint() {
        let override_ip: IpAddr = "192.0.2.10".parse().unwrap();
        let backend = FakeBackend::with_records(&[("a.example.com", "192.0.2.10")]);
        let reconciler = RecordReconciler::new(backend.clone());

        // the status addresses moved, the pinned address did not
        let old = snapshot_at(&["a.example.com"], true, &["10.1.1.1"]);
        let new = snapshot_at(&["a.example.com"], true, &["10.2.2.2"]);

        dispatch_update(&reconciler, &old, &new, Ok(override_ip), Some(override_ip))
            .await
            .unwrap();

        assert!(backend.mutations().is_empty());
    }

    #[tokio::test]
    async fn dispatch_repoints_when_status_address_moved() {
        let backend = FakeBackend::with_records(&[("a.example.com", "10.1.1.1")]);
        let reconciler = RecordReconciler::new(backend.clone());

        let old = snapshot_at(&["a.example.com"], true, &["10.1.1.1"]);
        let new = snapshot_at(&["a.example.com"], true, &["10.2.2.2"]);
        let new_ip: IpAddr = "10.2.2.2".parse().unwrap();

        dispatch_update(&reconciler, &old, &new, Ok(new_ip), None)
            .await
            .unwrap();

        let mutations = backend.mutations();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0].action, Action::Delete);
        assert_eq!(mutations[1].action, Action::Add);
        assert_eq!(mutations[1].record.ip, new_ip);
    }

    #[tokio::test]
    async fn dispatch_skips_unmanaged_pair() {
        let backend = FakeBackend::default();
        let reconciler = RecordReconciler::new(backend.clone());

        let old = snapshot_at(&["a.example.com"], false, &[]);
        let new = snapshot_at(&["a.example.com"], false, &[]);

        dispatch_update(&reconciler, &old, &new, Err(Error::NoLoadBalancerIp), None)
            .await
            .unwrap();

        assert!(backend.mutations().is_empty());
    }

    #[tokio::test]
    async fn unmanaged_surfaces_absent_records() {
        let backend = FakeBackend::default();
        let reconciler = RecordReconciler::new(backend.clone());

        let err = apply_unmanaged(&reconciler, &snapshot(&["a.example.com"]), ip())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(provider::Error::RecordNotFound(_))
        ));
    }
}
