use std::collections::VecDeque;

use async_trait::async_trait;
use lib_identity::{Contact, NodeId, BUCKET_COUNT};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Bucket size: each bucket holds at most this many contacts.
pub const K: usize = 20;
/// Lookup fan-out width used to seed iterative lookups.
pub const ALPHA: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("cannot add local node to its own routing table")]
    SelfReference,
}

/// Injected liveness check used by [`RoutingTable::update`] to implement the
/// ping-least-recently-seen eviction policy without the routing table
/// depending on the networking crate.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_alive(&self, contact: &Contact) -> bool;
}

/// Kademlia routing table: 256 buckets, each an LRU-ordered, capacity-`K`
/// list of contacts, indexed by XOR distance from the local id.
///
/// Each bucket has its own lock; there is no global lock, and callers may
/// observe a weakly consistent snapshot across buckets. Never acquire a
/// network channel while holding a bucket lock.
pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<RwLock<VecDeque<Contact>>>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId) -> Self {
        let buckets = (0..BUCKET_COUNT)
            .map(|_| RwLock::new(VecDeque::with_capacity(K)))
            .collect();
        Self { local_id, buckets }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    fn bucket_index(&self, nid: &NodeId) -> usize {
        self.local_id.distance(nid)
    }

    /// Unconditionally place a contact that has not necessarily been
    /// observed alive (e.g. a bootstrap peer). No-op if already present or
    /// if the bucket is already full.
    pub async fn add(&self, contact: Contact) -> Result<(), RoutingError> {
        if contact.nid == self.local_id {
            return Err(RoutingError::SelfReference);
        }
        let bucket = &self.buckets[self.bucket_index(&contact.nid)];
        let mut guard = bucket.write().await;
        if guard.iter().any(|c| c.nid == contact.nid) {
            return Ok(());
        }
        if guard.len() < K {
            guard.push_front(contact);
        }
        Ok(())
    }

    /// Record that `contact` was just observed alive: move it to the front
    /// of its bucket, or insert it if there is room. If the bucket is full,
    /// ping its least-recently-seen entry (without holding the bucket
    /// lock): a response keeps the old entry and discards `contact`; a
    /// timeout evicts the old entry and inserts `contact` at the front.
    pub async fn update(
        &self,
        contact: Contact,
        probe: &dyn LivenessProbe,
    ) -> Result<(), RoutingError> {
        if contact.nid == self.local_id {
            return Err(RoutingError::SelfReference);
        }
        let bucket = &self.buckets[self.bucket_index(&contact.nid)];

        {
            let mut guard = bucket.write().await;
            if let Some(pos) = guard.iter().position(|c| c.nid == contact.nid) {
                let existing = guard.remove(pos).expect("position just found");
                guard.push_front(existing);
                return Ok(());
            }
            if guard.len() < K {
                guard.push_front(contact);
                return Ok(());
            }
        }

        let least_recently_seen = {
            let guard = bucket.read().await;
            guard.back().cloned()
        };

        let Some(lrs) = least_recently_seen else {
            bucket.write().await.push_front(contact);
            return Ok(());
        };

        if probe.is_alive(&lrs).await {
            trace!(nid = %lrs.nid, "bucket full, least-recently-seen responded, discarding new contact");
            let mut guard = bucket.write().await;
            if let Some(pos) = guard.iter().position(|c| c.nid == lrs.nid) {
                let existing = guard.remove(pos).expect("position just found");
                guard.push_front(existing);
            }
        } else {
            debug!(nid = %lrs.nid, "bucket full, least-recently-seen timed out, evicting");
            let mut guard = bucket.write().await;
            guard.retain(|c| c.nid != lrs.nid);
            guard.push_front(contact);
        }

        Ok(())
    }

    /// Remove a contact by id. Returns whether it was present.
    pub async fn drop_contact(&self, nid: &NodeId) -> bool {
        let bucket = &self.buckets[self.bucket_index(nid)];
        let mut guard = bucket.write().await;
        if let Some(pos) = guard.iter().position(|c| &c.nid == nid) {
            guard.remove(pos);
            true
        } else {
            false
        }
    }

    /// Up to `K` contacts closest to `target`, excluding `sender`, starting
    /// at the bucket for `target`'s own distance and spreading outward.
    pub async fn find_node(&self, sender: &NodeId, target: &NodeId) -> Vec<Contact> {
        self.collect_closest(sender, target, K).await
    }

    /// Like [`find_node`](Self::find_node) but capped at `ALPHA`, used to
    /// seed iterative lookups. Never returns the local node (it is never
    /// stored in the table).
    pub async fn get_alpha(&self, target: &NodeId) -> Vec<Contact> {
        self.collect_closest(&self.local_id, target, ALPHA).await
    }

    async fn collect_closest(&self, sender: &NodeId, target: &NodeId, limit: usize) -> Vec<Contact> {
        let mut out = Vec::with_capacity(limit);
        let origin = self.bucket_index(target);

        {
            let guard = self.buckets[origin].read().await;
            for c in guard.iter() {
                if &c.nid == sender {
                    continue;
                }
                out.push(c.clone());
                if out.len() == limit {
                    return out;
                }
            }
        }

        let mut offset = 1usize;
        loop {
            let mut hit_high = true;
            let mut hit_low = true;

            if let Some(high) = origin.checked_add(offset) {
                if high < BUCKET_COUNT {
                    hit_high = false;
                    let guard = self.buckets[high].read().await;
                    for c in guard.iter() {
                        if &c.nid == sender {
                            continue;
                        }
                        out.push(c.clone());
                        if out.len() == limit {
                            return out;
                        }
                    }
                }
            }

            if let Some(low) = origin.checked_sub(offset) {
                hit_low = false;
                let guard = self.buckets[low].read().await;
                for c in guard.iter() {
                    if &c.nid == sender {
                        continue;
                    }
                    out.push(c.clone());
                    if out.len() == limit {
                        return out;
                    }
                }
            }

            if hit_high && hit_low {
                break;
            }
            offset += 1;
        }

        out
    }

    pub async fn count(&self) -> usize {
        let mut total = 0;
        for bucket in &self.buckets {
            total += bucket.read().await.len();
        }
        total
    }

    pub async fn get_all(&self) -> Vec<Contact> {
        let mut out = Vec::new();
        for bucket in &self.buckets {
            out.extend(bucket.read().await.iter().cloned());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAlive;
    #[async_trait]
    impl LivenessProbe for AlwaysAlive {
        async fn is_alive(&self, _contact: &Contact) -> bool {
            true
        }
    }

    struct AlwaysDead;
    #[async_trait]
    impl LivenessProbe for AlwaysDead {
        async fn is_alive(&self, _contact: &Contact) -> bool {
            false
        }
    }

    fn contact() -> Contact {
        Contact::new(NodeId::random(), "127.0.0.1:9000")
    }

    #[tokio::test]
    async fn add_rejects_self() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);
        let err = table.add(Contact::new(local, "x")).await.unwrap_err();
        assert_eq!(err, RoutingError::SelfReference);
    }

    #[tokio::test]
    async fn add_then_find_returns_it_excluding_sender() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);
        let peer = contact();
        table.add(peer.clone()).await.unwrap();

        let found = table.find_node(&NodeId::random(), &peer.nid).await;
        assert!(found.iter().any(|c| c.nid == peer.nid));

        let found_excluding_self_peer = table.find_node(&peer.nid, &peer.nid).await;
        assert!(!found_excluding_self_peer.iter().any(|c| c.nid == peer.nid));
    }

    #[tokio::test]
    async fn update_moves_existing_contact_to_front() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);
        let a = contact();
        let b = contact();
        table.update(a.clone(), &AlwaysAlive).await.unwrap();
        table.update(b.clone(), &AlwaysAlive).await.unwrap();
        table.update(a.clone(), &AlwaysAlive).await.unwrap();

        let idx_a = local.distance(&a.nid);
        let idx_b = local.distance(&b.nid);
        if idx_a == idx_b {
            let all = table.get_all().await;
            assert_eq!(all[0].nid, a.nid);
        }
    }

    #[tokio::test]
    async fn full_bucket_keeps_responsive_least_recently_seen() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);

        // Force everyone into the same bucket by fixing the top byte so the
        // distance (position of highest differing bit) is identical.
        let mut contacts = Vec::new();
        for i in 0..K {
            let mut bytes = [0u8; lib_identity::NID_LEN];
            bytes[31] = i as u8 + 1;
            contacts.push(Contact::new(NodeId::from_bytes(bytes), format!("peer-{i}")));
        }
        for c in &contacts {
            table.update(c.clone(), &AlwaysAlive).await.unwrap();
        }
        assert_eq!(table.count().await, K);

        let mut overflow_bytes = [0u8; lib_identity::NID_LEN];
        overflow_bytes[31] = 200;
        let overflow = Contact::new(NodeId::from_bytes(overflow_bytes), "overflow");

        table.update(overflow.clone(), &AlwaysAlive).await.unwrap();
        assert_eq!(table.count().await, K);
        let all = table.get_all().await;
        assert!(!all.iter().any(|c| c.nid == overflow.nid));
    }

    #[tokio::test]
    async fn full_bucket_evicts_unresponsive_least_recently_seen() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);

        let mut contacts = Vec::new();
        for i in 0..K {
            let mut bytes = [0u8; lib_identity::NID_LEN];
            bytes[31] = i as u8 + 1;
            contacts.push(Contact::new(NodeId::from_bytes(bytes), format!("peer-{i}")));
        }
        for c in &contacts {
            table.update(c.clone(), &AlwaysAlive).await.unwrap();
        }
        let least_recently_seen = contacts[0].nid;

        let mut overflow_bytes = [0u8; lib_identity::NID_LEN];
        overflow_bytes[31] = 200;
        let overflow = Contact::new(NodeId::from_bytes(overflow_bytes), "overflow");

        table.update(overflow.clone(), &AlwaysDead).await.unwrap();
        assert_eq!(table.count().await, K);
        let all = table.get_all().await;
        assert!(!all.iter().any(|c| c.nid == least_recently_seen));
        assert!(all.iter().any(|c| c.nid == overflow.nid));
    }

    #[tokio::test]
    async fn drop_removes_contact() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);
        let peer = contact();
        table.add(peer.clone()).await.unwrap();
        assert!(table.drop_contact(&peer.nid).await);
        assert!(!table.drop_contact(&peer.nid).await);
    }
}
