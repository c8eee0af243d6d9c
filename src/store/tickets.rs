use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::JsonStore;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub channel_id: u64,
    pub owner_id: u64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_number: Option<u64>,
}

/// `tickets.json`: open ticket channels keyed by channel id.
pub struct TicketStore {
    store: JsonStore<HashMap<String, TicketRecord>>,
    opening: DashSet<u64>,
}

/// Why a member cannot open another support ticket right now.
#[derive(Debug, PartialEq, Eq)]
pub enum Busy {
    Open(TicketRecord),
    Opening,
}

/// Held while a member's ticket channel is being created. Dropping it lets
/// the member try again.
pub struct TicketClaim<'a> {
    opening: &'a DashSet<u64>,
    owner_id: u64,
}

impl Drop for TicketClaim<'_> {
    fn drop(&mut self) {
        self.opening.remove(&self.owner_id);
    }
}

impl TicketStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path).await,
            opening: DashSet::new(),
        }
    }

    pub async fn get(&self, channel_id: u64) -> Option<TicketRecord> {
        let key = channel_id.to_string();
        self.store.read(|t| t.get(&key).cloned()).await
    }

    /// The support ticket `owner_id` still has open. Deal channels don't count.
    pub async fn open_ticket_of(&self, owner_id: u64) -> Option<TicketRecord> {
        self.store
            .read(|t| {
                t.values()
                    .find(|r| r.owner_id == owner_id && r.deal_number.is_none())
                    .cloned()
            })
            .await
    }

    /// Reserves the right to open a support ticket for `owner_id`. Keep the
    /// claim until the new ticket is inserted.
    pub async fn claim(&self, owner_id: u64) -> Result<TicketClaim<'_>, Busy> {
        if !self.opening.insert(owner_id) {
            return Err(Busy::Opening);
        }
        let claim = TicketClaim {
            opening: &self.opening,
            owner_id,
        };
        match self.open_ticket_of(owner_id).await {
            Some(existing) => Err(Busy::Open(existing)),
            None => Ok(claim),
        }
    }

    pub async fn insert(&self, record: TicketRecord) -> Result<(), StoreError> {
        self.store
            .update(|t| {
                t.insert(record.channel_id.to_string(), record);
                Ok(())
            })
            .await
    }

    pub async fn remove(&self, channel_id: u64) -> Result<Option<TicketRecord>, StoreError> {
        let key = channel_id.to_string();
        self.store.update(|t| Ok(t.remove(&key))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_open_support_ticket_but_not_deals() {
        let dir = tempfile::tempdir().unwrap();
        let store = TicketStore::open(dir.path().join("tickets.json")).await;

        store
            .insert(TicketRecord {
                channel_id: 1,
                owner_id: 9,
                reason: "Deal #1042".into(),
                deal_number: Some(1042),
            })
            .await
            .unwrap();
        assert!(store.open_ticket_of(9).await.is_none());

        store
            .insert(TicketRecord {
                channel_id: 2,
                owner_id: 9,
                reason: "Support".into(),
                deal_number: None,
            })
            .await
            .unwrap();
        assert_eq!(store.open_ticket_of(9).await.map(|t| t.channel_id), Some(2));

        assert!(store.remove(2).await.unwrap().is_some());
        assert!(store.remove(2).await.unwrap().is_none());
        assert!(store.open_ticket_of(9).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_claim_per_member_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(TicketStore::open(dir.path().join("tickets.json")).await);

        let claim = store.claim(9).await.unwrap();
        let racers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim(9).await.err() })
            })
            .collect();
        for racer in racers {
            assert_eq!(racer.await.unwrap(), Some(Busy::Opening));
        }
        assert!(store.claim(10).await.is_ok());

        store
            .insert(TicketRecord {
                channel_id: 3,
                owner_id: 9,
                reason: "Support".into(),
                deal_number: None,
            })
            .await
            .unwrap();
        drop(claim);

        match store.claim(9).await {
            Err(Busy::Open(existing)) => assert_eq!(existing.channel_id, 3),
            _ => panic!("expected the recorded ticket"),
        }
        store.remove(3).await.unwrap();
        assert!(store.claim(9).await.is_ok());
    }
}
