pub use client::PiholeClient;
pub use error::Error;
pub use reconcile::RecordReconciler;
pub use record::{Action, ChangeSet, HostRecord};

use async_trait::async_trait;

mod client;
mod error;
mod reconcile;
mod record;

/// The dns backend seam: a live record read plus a single keyed mutation.
#[async_trait]
pub trait DnsBackend {
    async fn list_records(&self) -> Result<Vec<HostRecord>, Error>;

    async fn apply_change(&self, change_set: &ChangeSet) -> Result<(), Error>;
}
