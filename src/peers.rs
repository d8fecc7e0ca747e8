//! Collects the addresses of the units taking part in the peer relation.

use std::cmp::Ordering;
use std::net::IpAddr;

use async_trait::async_trait;
use log::debug;

use crate::config::PeerOrder;
use crate::error::Result;
use crate::host::Host;

const INGRESS_ADDRESS: &str = "ingress-address";

#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn peer_addresses(&self) -> Result<Vec<String>>;
}

/// Reads `ingress-address` of every remote unit in the peer relation and
/// appends the local unit's own address.
pub struct RelationPeers<'a> {
    host: &'a dyn Host,
    relation: &'a str,
    order: PeerOrder,
}

impl<'a> RelationPeers<'a> {
    pub fn new(host: &'a dyn Host, relation: &'a str, order: PeerOrder) -> Self {
        Self {
            host,
            relation,
            order,
        }
    }
}

#[async_trait]
impl PeerSource for RelationPeers<'_> {
    async fn peer_addresses(&self) -> Result<Vec<String>> {
        let mut addresses = Vec::new();
        for relation_id in self.host.relation_ids(self.relation).await? {
            for unit in self.host.relation_units(&relation_id).await? {
                let data = self.host.relation_get(&relation_id, &unit).await?;
                match data.get(INGRESS_ADDRESS).filter(|a| !a.is_empty()) {
                    Some(address) => addresses.push(address.clone()),
                    None => debug!("{} has not published an ingress address yet", unit),
                }
            }
        }
        addresses.push(self.host.ingress_address(self.relation).await?);

        if self.order == PeerOrder::Sorted {
            sort_addresses(&mut addresses);
        }
        Ok(addresses)
    }
}

/// IP addresses in numeric order (v4 before v6), then anything that is
/// not an IP in plain string order. Duplicates are dropped.
pub fn sort_addresses(addresses: &mut Vec<String>) {
    addresses.sort_by(|a, b| match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    addresses.dedup();
}
