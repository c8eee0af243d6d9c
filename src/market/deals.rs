use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::MarketError;
use crate::store::JsonStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Approved,
    PaymentPending,
    PaymentConfirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl DealStatus {
    pub const ALL: [DealStatus; 6] = [
        DealStatus::Approved,
        DealStatus::PaymentPending,
        DealStatus::PaymentConfirmed,
        DealStatus::InProgress,
        DealStatus::Completed,
        DealStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, DealStatus::Completed | DealStatus::Cancelled)
    }

    /// The next step of the pipeline, `None` once terminal.
    pub fn successor(self) -> Option<DealStatus> {
        match self {
            DealStatus::Approved => Some(DealStatus::PaymentPending),
            DealStatus::PaymentPending => Some(DealStatus::PaymentConfirmed),
            DealStatus::PaymentConfirmed => Some(DealStatus::InProgress),
            DealStatus::InProgress => Some(DealStatus::Completed),
            DealStatus::Completed | DealStatus::Cancelled => None,
        }
    }

    pub fn can_become(self, next: DealStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == DealStatus::Cancelled || self.successor() == Some(next)
    }

    pub fn key(self) -> &'static str {
        match self {
            DealStatus::Approved => "approved",
            DealStatus::PaymentPending => "payment_pending",
            DealStatus::PaymentConfirmed => "payment_confirmed",
            DealStatus::InProgress => "in_progress",
            DealStatus::Completed => "completed",
            DealStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_key(key: &str) -> Option<DealStatus> {
        DealStatus::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DealStatus::Approved => "Approved",
            DealStatus::PaymentPending => "Payment Pending",
            DealStatus::PaymentConfirmed => "Payment Confirmed",
            DealStatus::InProgress => "In Progress",
            DealStatus::Completed => "Completed",
            DealStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealTicket {
    pub deal_number: u64,
    pub job_id: u64,
    pub buyer_id: u64,
    pub seller_id: u64,
    pub job_title: String,
    pub agreed_price: String,
    pub status: DealStatus,
    pub channel_id: u64,
}

/// `deal_tickets.json`: deal number -> ticket.
pub struct DealBook {
    store: JsonStore<HashMap<String, DealTicket>>,
}

impl DealBook {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path).await,
        }
    }

    pub async fn get(&self, deal_number: u64) -> Option<DealTicket> {
        let key = deal_number.to_string();
        self.store.read(|d| d.get(&key).cloned()).await
    }

    pub async fn insert(&self, ticket: DealTicket) -> Result<(), MarketError> {
        self.store
            .update(|d| {
                d.insert(ticket.deal_number.to_string(), ticket);
                Ok(())
            })
            .await
    }

    pub async fn set_status(&self, deal_number: u64, next: DealStatus) -> Result<DealTicket, MarketError> {
        let key = deal_number.to_string();
        self.store
            .update(|d| {
                let ticket = d.get_mut(&key).ok_or(MarketError::UnknownDeal(deal_number))?;
                if !ticket.status.can_become(next) {
                    return Err(MarketError::InvalidTransition {
                        from: ticket.status,
                        to: next,
                    });
                }
                ticket.status = next;
                Ok(ticket.clone())
            })
            .await
    }
}
