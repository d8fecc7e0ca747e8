//! Trusted-domain reconciliation.
//!
//! The desired list is the fixed entries (`localhost` and the public
//! hostname) followed by the current peer addresses. The store is always
//! rewritten in full, so a run that failed half way is repaired by the
//! next one.

use log::{debug, info};

use crate::error::Result;
use crate::store::DomainStore;

/// Entries 0 and 1 are reserved for `localhost` and the fqdn.
pub const FIXED_ENTRIES: usize = 2;

pub struct Reconciler<'a> {
    store: &'a dyn DomainStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn DomainStore) -> Self {
        Self { store }
    }

    /// Rewrites the store to `fixed_prefix ++ peers` and returns that list.
    ///
    /// Only the first [`FIXED_ENTRIES`] of `fixed_prefix` are used; a
    /// shorter prefix is accepted as is. Peers are neither sorted nor
    /// deduplicated here, and a peer equal to a prefix entry appears twice.
    pub async fn reconcile(&self, fixed_prefix: &[String], peers: &[String]) -> Result<Vec<String>> {
        let current = self.store.read().await?;
        debug!("Current trusted domains: {:?}", current);

        let fixed = &fixed_prefix[..fixed_prefix.len().min(FIXED_ENTRIES)];
        let desired: Vec<String> = fixed.iter().chain(peers).cloned().collect();

        self.store.write_all(&desired).await?;
        if current != desired {
            info!("Trusted domains updated: {:?}", desired);
        }
        Ok(desired)
    }
}
