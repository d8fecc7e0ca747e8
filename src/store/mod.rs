use crate::error::Result;
use async_trait::async_trait;
use log::debug;

pub mod occ;
pub use occ::Occ;

/// Ordered list of Nextcloud trusted domains, held by an external store.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn read(&self) -> Result<Vec<String>>;

    /// Remove every entry. Succeeds on an already empty list.
    async fn clear(&self) -> Result<()>;

    /// Overwrite the entry at `index`.
    async fn set(&self, domain: &str, index: usize) -> Result<()>;

    /// Replace the whole list, leaving entries at contiguous indices
    /// `0..domains.len()`. Not atomic: a failure part way leaves a prefix.
    async fn write_all(&self, domains: &[String]) -> Result<()> {
        self.clear().await?;
        for (index, domain) in domains.iter().enumerate() {
            self.set(domain, index).await?;
        }
        debug!("Wrote {} trusted domains", domains.len());
        Ok(())
    }
}
