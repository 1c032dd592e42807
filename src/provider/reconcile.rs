use tracing::{info, instrument};

use crate::provider::error::Error;
use crate::provider::record::{Action, ChangeSet, HostRecord};
use crate::provider::DnsBackend;

/// Decides whether a change set is a no-op, a straight apply or a
/// delete-then-add migration, and issues the backend calls.
///
/// The backend is the source of truth: both operations re-fetch the record
/// list immediately before mutating instead of trusting any cached view. The
/// backend allows at most one record per hostname only by convention, this
/// reconciler enforces it from the client side.
#[derive(Debug, Clone)]
pub struct RecordReconciler<B> {
    backend: B,
}

impl<B> RecordReconciler<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: DnsBackend + Sync> RecordReconciler<B> {
    /// Dispatch a change set by its action.
    #[instrument(err, skip(self))]
    pub async fn modify(&self, change_set: &ChangeSet) -> Result<(), Error> {
        match change_set.action {
            Action::Add => self.add(change_set).await,
            Action::Delete => self.delete(change_set).await,
        }
    }

    #[instrument(err, skip(self))]
    pub async fn add(&self, change_set: &ChangeSet) -> Result<(), Error> {
        let records = self.backend.list_records().await?;
        let record = &change_set.record;

        if let Some(existing) = find_record(&records, &record.hostname) {
            if existing == record {
                info!(hostname = %record.hostname, ip = %record.ip, "record already exists");

                return Ok(());
            }

            info!(
                hostname = %record.hostname,
                old_ip = %existing.ip,
                new_ip = %record.ip,
                "record exists with different ip, migrate"
            );

            // the backend has no atomic update, model migration as
            // delete-then-add
            let migration = ChangeSet {
                record: existing.clone(),
                action: Action::Delete,
            };

            self.delete(&migration).await?;
        }

        self.backend.apply_change(change_set).await?;

        info!(hostname = %record.hostname, ip = %record.ip, "record created");

        Ok(())
    }

    #[instrument(err, skip(self))]
    pub async fn delete(&self, change_set: &ChangeSet) -> Result<(), Error> {
        let records = self.backend.list_records().await?;
        let record = &change_set.record;

        if find_record(&records, &record.hostname).is_none() {
            return Err(Error::RecordNotFound(record.hostname.clone()));
        }

        self.backend.apply_change(change_set).await?;

        info!(hostname = %record.hostname, ip = %record.ip, "record deleted");

        Ok(())
    }
}

fn find_record<'a>(records: &'a [HostRecord], hostname: &str) -> Option<&'a HostRecord> {
    records.iter().find(|record| record.hostname == hostname)
}
