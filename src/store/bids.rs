use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::JsonStore;
use crate::error::MarketError;

/// Maximum number of live bids on a single job posting.
pub const MAX_BIDS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    pub bidder_id: u64,
    pub price: String,
    pub delivery_time: String,
}

/// `bids.json`: job message id -> bids in submission order.
pub struct BidLedger {
    store: JsonStore<HashMap<String, Vec<BidRecord>>>,
}

impl BidLedger {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path).await,
        }
    }

    pub async fn get_bids(&self, job_id: u64) -> Vec<BidRecord> {
        let key = job_id.to_string();
        self.store
            .read(|jobs| jobs.get(&key).cloned().unwrap_or_default())
            .await
    }

    /// Appends a bid, returning the job's bids after the insert.
    pub async fn add_bid(&self, job_id: u64, bid: BidRecord) -> Result<Vec<BidRecord>, MarketError> {
        let key = job_id.to_string();
        self.store
            .update(|jobs| {
                let bids = jobs.entry(key).or_default();
                if bids.len() >= MAX_BIDS {
                    return Err(MarketError::BidLimitExceeded(MAX_BIDS));
                }
                if bids.iter().any(|b| b.bidder_id == bid.bidder_id) {
                    return Err(MarketError::DuplicateBidder);
                }
                bids.push(bid);
                Ok(bids.clone())
            })
            .await
    }

    /// Removes `user_id`'s bid, returning the job's remaining bids.
    pub async fn remove_bid(&self, job_id: u64, user_id: u64) -> Result<Vec<BidRecord>, MarketError> {
        let key = job_id.to_string();
        self.store
            .update(|jobs| {
                let bids = jobs.get_mut(&key).ok_or(MarketError::NoBid)?;
                let before = bids.len();
                bids.retain(|b| b.bidder_id != user_id);
                if bids.len() == before {
                    return Err(MarketError::NoBid);
                }
                let remaining = bids.clone();
                if remaining.is_empty() {
                    jobs.remove(&key);
                }
                Ok(remaining)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(bidder_id: u64, price: &str) -> BidRecord {
        BidRecord {
            bidder_id,
            price: price.to_string(),
            delivery_time: "3 days".to_string(),
        }
    }

    #[tokio::test]
    async fn unknown_job_has_no_bids() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = BidLedger::open(dir.path().join("bids.json")).await;
        assert!(ledger.get_bids(42).await.is_empty());
    }

    #[tokio::test]
    async fn caps_at_six_bids() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = BidLedger::open(dir.path().join("bids.json")).await;

        for bidder in 1..=MAX_BIDS as u64 {
            ledger.add_bid(7, bid(bidder, "$10")).await.unwrap();
        }
        let err = ledger.add_bid(7, bid(99, "$5")).await.unwrap_err();
        assert!(matches!(err, MarketError::BidLimitExceeded(6)));
        assert_eq!(ledger.get_bids(7).await.len(), MAX_BIDS);
    }

    #[tokio::test]
    async fn rejects_second_bid_from_same_user() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = BidLedger::open(dir.path().join("bids.json")).await;

        ledger.add_bid(7, bid(1, "$10")).await.unwrap();
        let err = ledger.add_bid(7, bid(1, "$8")).await.unwrap_err();
        assert!(matches!(err, MarketError::DuplicateBidder));
        assert_eq!(ledger.get_bids(7).await, vec![bid(1, "$10")]);
    }

    #[tokio::test]
    async fn remove_keeps_order_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bids.json");
        let ledger = BidLedger::open(&path).await;

        ledger.add_bid(7, bid(1, "$10")).await.unwrap();
        ledger.add_bid(7, bid(2, "$20")).await.unwrap();
        ledger.add_bid(7, bid(3, "$30")).await.unwrap();

        let remaining = ledger.remove_bid(7, 2).await.unwrap();
        assert_eq!(remaining, vec![bid(1, "$10"), bid(3, "$30")]);
        assert!(matches!(ledger.remove_bid(7, 2).await, Err(MarketError::NoBid)));
        assert!(matches!(ledger.remove_bid(8, 1).await, Err(MarketError::NoBid)));

        let reopened = BidLedger::open(&path).await;
        assert_eq!(reopened.get_bids(7).await.len(), 2);
    }

    #[tokio::test]
    async fn file_layout_is_job_id_to_bid_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bids.json");
        let ledger = BidLedger::open(&path).await;
        ledger.add_bid(123, bid(5, "$50")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["123"][0]["bidder_id"], 5);
        assert_eq!(raw["123"][0]["price"], "$50");
        assert_eq!(raw["123"][0]["delivery_time"], "3 days");
    }
}
