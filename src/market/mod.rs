//! Job postings, bidding and deal tickets.
//!
//! A posting is keyed by the id of the Discord message it is rendered in.
//! Every workflow step runs under one lock so guard checks and the writes
//! that follow them cannot interleave with another interaction.

pub mod deals;

pub use deals::{DealBook, DealStatus, DealTicket};

use serde::{Deserialize, Serialize};
use serenity::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::MarketError;
use crate::store::bids::{BidLedger, BidRecord, MAX_BIDS};
use crate::store::counter::Counter;
use crate::store::JsonStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Open,
    /// Finalization started but has not committed. A crash here leaves the
    /// posting closed to bids; the owner may finalize again.
    Finalizing,
    Finalized { deal_number: u64, seller_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: u64,
    pub channel_id: u64,
    pub owner_id: u64,
    pub title: String,
    pub description: String,
    pub budget: String,
    pub deadline: String,
    pub location: String,
    pub state: JobState,
}

/// State of a posting as seen by users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiddingState {
    Open,
    Full,
    Finalizing,
    Finalized,
}

impl JobPosting {
    pub fn bidding_state(&self, bid_count: usize) -> BiddingState {
        match self.state {
            JobState::Open if bid_count >= MAX_BIDS => BiddingState::Full,
            JobState::Open => BiddingState::Open,
            JobState::Finalizing => BiddingState::Finalizing,
            JobState::Finalized { .. } => BiddingState::Finalized,
        }
    }
}

/// The Discord side effects finalization needs.
#[async_trait]
pub trait DealPlatform: Send + Sync {
    async fn is_member(&self, user_id: u64) -> Result<bool, serenity::Error>;

    /// Creates the private deal channel and returns its id.
    async fn open_deal_channel(&self, deal: &DealTicket) -> Result<u64, serenity::Error>;

    async fn remove_channel(&self, channel_id: u64) -> Result<(), serenity::Error>;
}

pub struct Marketplace {
    jobs: JsonStore<HashMap<String, JobPosting>>,
    ledger: BidLedger,
    deal_numbers: Counter,
    deals: DealBook,
    workflow: Mutex<()>,
}

impl Marketplace {
    pub async fn open(data_dir: &Path) -> Self {
        Self {
            jobs: JsonStore::open(data_dir.join("jobs.json")).await,
            ledger: BidLedger::open(data_dir.join("bids.json")).await,
            deal_numbers: Counter::deals(data_dir.join("deals.json")).await,
            deals: DealBook::open(data_dir.join("deal_tickets.json")).await,
            workflow: Mutex::new(()),
        }
    }

    pub async fn post_job(&self, job: JobPosting) -> Result<(), MarketError> {
        info!("Job {} posted by {}: {}", job.job_id, job.owner_id, job.title);
        self.jobs
            .update(|jobs| {
                jobs.insert(job.job_id.to_string(), job);
                Ok(())
            })
            .await
    }

    pub async fn job(&self, job_id: u64) -> Option<JobPosting> {
        let key = job_id.to_string();
        self.jobs.read(|jobs| jobs.get(&key).cloned()).await
    }

    pub async fn bids(&self, job_id: u64) -> Vec<BidRecord> {
        self.ledger.get_bids(job_id).await
    }

    pub async fn deal(&self, deal_number: u64) -> Option<DealTicket> {
        self.deals.get(deal_number).await
    }

    async fn require_job(&self, job_id: u64) -> Result<JobPosting, MarketError> {
        self.job(job_id).await.ok_or(MarketError::UnknownJob(job_id))
    }

    pub async fn submit_bid(&self, job_id: u64, bid: BidRecord) -> Result<Vec<BidRecord>, MarketError> {
        let _turn = self.workflow.lock().await;
        let job = self.require_job(job_id).await?;

        if job.state != JobState::Open {
            return Err(MarketError::Closed);
        }
        if bid.bidder_id == job.owner_id {
            return Err(MarketError::OwnJob);
        }

        let bidder = bid.bidder_id;
        let bids = self.ledger.add_bid(job_id, bid).await?;
        info!("Bid on job {} by {} ({} total)", job_id, bidder, bids.len());
        Ok(bids)
    }

    pub async fn withdraw_bid(&self, job_id: u64, bidder_id: u64) -> Result<Vec<BidRecord>, MarketError> {
        let _turn = self.workflow.lock().await;
        let job = self.require_job(job_id).await?;

        if job.state != JobState::Open {
            return Err(MarketError::Closed);
        }

        let bids = self.ledger.remove_bid(job_id, bidder_id).await?;
        info!("Bid on job {} by {} removed", job_id, bidder_id);
        Ok(bids)
    }

    /// Checks the guards of `finalize` that don't depend on the winner.
    pub async fn can_finalize(&self, job_id: u64, caller_id: u64) -> Result<Vec<BidRecord>, MarketError> {
        let job = self.require_job(job_id).await?;
        if matches!(job.state, JobState::Finalized { .. }) {
            return Err(MarketError::Closed);
        }
        if caller_id != job.owner_id {
            return Err(MarketError::NotOwner);
        }
        let bids = self.ledger.get_bids(job_id).await;
        if bids.is_empty() {
            return Err(MarketError::NoBids);
        }
        Ok(bids)
    }

    /// Accepts `seller_id`'s bid: allocates a deal number, opens the deal
    /// channel, then records the deal and locks the posting.
    pub async fn finalize(
        &self,
        platform: &dyn DealPlatform,
        job_id: u64,
        caller_id: u64,
        seller_id: u64,
    ) -> Result<DealTicket, MarketError> {
        let _turn = self.workflow.lock().await;

        let bids = self.can_finalize(job_id, caller_id).await?;
        let job = self.require_job(job_id).await?;
        let winning = bids
            .into_iter()
            .find(|b| b.bidder_id == seller_id)
            .ok_or(MarketError::NotABidder)?;

        if !platform.is_member(seller_id).await? {
            return Err(MarketError::BidderLeft);
        }

        self.set_state(job_id, JobState::Finalizing).await?;

        let result = self.open_deal(platform, &job, winning).await;
        if result.is_err() {
            if let Err(e) = self.set_state(job_id, JobState::Open).await {
                warn!("Failed to reopen job {} after aborted finalize: {}", job_id, e);
            }
        }
        result
    }

    async fn open_deal(
        &self,
        platform: &dyn DealPlatform,
        job: &JobPosting,
        winning: BidRecord,
    ) -> Result<DealTicket, MarketError> {
        let deal_number = self.deal_numbers.next().await?;
        let mut ticket = DealTicket {
            deal_number,
            job_id: job.job_id,
            buyer_id: job.owner_id,
            seller_id: winning.bidder_id,
            job_title: job.title.clone(),
            agreed_price: winning.price,
            status: DealStatus::Approved,
            channel_id: 0,
        };

        ticket.channel_id = platform.open_deal_channel(&ticket).await?;

        let finalized = JobState::Finalized {
            deal_number,
            seller_id: ticket.seller_id,
        };
        // The caller reopens the posting if either write fails.
        let committed = match self.set_state(job.job_id, finalized).await {
            Ok(()) => self.deals.insert(ticket.clone()).await,
            Err(e) => Err(e),
        };

        if let Err(e) = committed {
            warn!("Deal #{} could not be recorded, removing its channel: {}", deal_number, e);
            if let Err(e) = platform.remove_channel(ticket.channel_id).await {
                warn!("Failed to remove channel of deal #{}: {}", deal_number, e);
            }
            return Err(e);
        }

        info!(
            "Deal #{} opened for job {}: buyer {} seller {}",
            deal_number, job.job_id, ticket.buyer_id, ticket.seller_id
        );
        Ok(ticket)
    }

    async fn set_state(&self, job_id: u64, state: JobState) -> Result<(), MarketError> {
        let key = job_id.to_string();
        self.jobs
            .update(|jobs| {
                let job = jobs.get_mut(&key).ok_or(MarketError::UnknownJob(job_id))?;
                job.state = state;
                Ok(())
            })
            .await
    }

    pub async fn advance_deal(&self, deal_number: u64, next: DealStatus) -> Result<DealTicket, MarketError> {
        let _turn = self.workflow.lock().await;
        let ticket = self.deals.set_status(deal_number, next).await?;
        info!("Deal #{} is now {}", deal_number, next);
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeGuild {
        departed: Vec<u64>,
        refuse_channel: bool,
        next_channel: AtomicU64,
        removed: StdMutex<Vec<u64>>,
        opened: AtomicBool,
    }

    #[async_trait]
    impl DealPlatform for FakeGuild {
        async fn is_member(&self, user_id: u64) -> Result<bool, serenity::Error> {
            Ok(!self.departed.contains(&user_id))
        }

        async fn open_deal_channel(&self, _deal: &DealTicket) -> Result<u64, serenity::Error> {
            if self.refuse_channel {
                return Err(serenity::Error::Other("missing permissions"));
            }
            self.opened.store(true, Ordering::SeqCst);
            Ok(900 + self.next_channel.fetch_add(1, Ordering::SeqCst))
        }

        async fn remove_channel(&self, channel_id: u64) -> Result<(), serenity::Error> {
            self.removed.lock().unwrap().push(channel_id);
            Ok(())
        }
    }

    const OWNER: u64 = 1;

    fn posting(job_id: u64) -> JobPosting {
        JobPosting {
            job_id,
            channel_id: 55,
            owner_id: OWNER,
            title: "Need a logo".into(),
            description: "Vector logo for a fintech startup".into(),
            budget: "$100".into(),
            deadline: "7 days".into(),
            location: "Remote".into(),
            state: JobState::Open,
        }
    }

    fn bid(bidder_id: u64, price: &str) -> BidRecord {
        BidRecord {
            bidder_id,
            price: price.into(),
            delivery_time: "5 days".into(),
        }
    }

    async fn market_with_job(dir: &tempfile::TempDir) -> Marketplace {
        let market = Marketplace::open(dir.path()).await;
        market.post_job(posting(10)).await.unwrap();
        market
    }

    #[tokio::test]
    async fn owner_cannot_bid_on_own_job() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;

        let err = market.submit_bid(10, bid(OWNER, "$1")).await.unwrap_err();
        assert!(matches!(err, MarketError::OwnJob));
        assert!(market.bids(10).await.is_empty());
    }

    #[tokio::test]
    async fn bidding_on_unknown_job_fails() {
        let dir = tempfile::tempdir().unwrap();
        let market = Marketplace::open(dir.path()).await;
        let err = market.submit_bid(77, bid(2, "$1")).await.unwrap_err();
        assert!(matches!(err, MarketError::UnknownJob(77)));
    }

    #[tokio::test]
    async fn state_becomes_full_at_six_bids() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;

        for bidder in 2..8 {
            market.submit_bid(10, bid(bidder, "$10")).await.unwrap();
        }
        let job = market.job(10).await.unwrap();
        assert_eq!(job.bidding_state(market.bids(10).await.len()), BiddingState::Full);

        let err = market.submit_bid(10, bid(50, "$9")).await.unwrap_err();
        assert!(matches!(err, MarketError::BidLimitExceeded(6)));

        market.withdraw_bid(10, 4).await.unwrap();
        let job = market.job(10).await.unwrap();
        assert_eq!(job.bidding_state(market.bids(10).await.len()), BiddingState::Open);
    }

    #[tokio::test]
    async fn finalize_without_bids_fails_and_stays_open() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;
        let guild = FakeGuild::default();

        let err = market.finalize(&guild, 10, OWNER, 2).await.unwrap_err();
        assert!(matches!(err, MarketError::NoBids));
        assert_eq!(market.job(10).await.unwrap().state, JobState::Open);
        assert!(!guild.opened.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn only_owner_may_finalize_and_only_a_bidder_can_win() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;
        let guild = FakeGuild::default();
        market.submit_bid(10, bid(2, "$50")).await.unwrap();

        let err = market.finalize(&guild, 10, 2, 2).await.unwrap_err();
        assert!(matches!(err, MarketError::NotOwner));

        let err = market.finalize(&guild, 10, OWNER, 3).await.unwrap_err();
        assert!(matches!(err, MarketError::NotABidder));
        assert_eq!(market.job(10).await.unwrap().state, JobState::Open);
    }

    #[tokio::test]
    async fn departed_bidder_cannot_win() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;
        let guild = FakeGuild {
            departed: vec![2],
            ..Default::default()
        };
        market.submit_bid(10, bid(2, "$50")).await.unwrap();

        let err = market.finalize(&guild, 10, OWNER, 2).await.unwrap_err();
        assert!(matches!(err, MarketError::BidderLeft));
        assert_eq!(market.job(10).await.unwrap().state, JobState::Open);
    }

    #[tokio::test]
    async fn finalize_creates_deal_and_locks_posting() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;
        let guild = FakeGuild::default();

        market.submit_bid(10, bid(2, "$50")).await.unwrap();
        market.submit_bid(10, bid(3, "$75")).await.unwrap();
        market.submit_bid(10, bid(4, "$60")).await.unwrap();

        let before = Counter::deals(dir.path().join("deals.json")).await.current().await;
        let ticket = market.finalize(&guild, 10, OWNER, 3).await.unwrap();

        assert_eq!(ticket.deal_number, before + 1);
        assert_eq!(ticket.seller_id, 3);
        assert_eq!(ticket.buyer_id, OWNER);
        assert_eq!(ticket.agreed_price, "$75");
        assert_eq!(ticket.status, DealStatus::Approved);
        assert_eq!(ticket.channel_id, 900);
        assert_eq!(market.deal(ticket.deal_number).await, Some(ticket.clone()));

        let job = market.job(10).await.unwrap();
        assert_eq!(
            job.state,
            JobState::Finalized {
                deal_number: ticket.deal_number,
                seller_id: 3
            }
        );
        assert_eq!(job.bidding_state(3), BiddingState::Finalized);

        assert!(matches!(
            market.submit_bid(10, bid(5, "$40")).await,
            Err(MarketError::Closed)
        ));
        assert!(matches!(market.withdraw_bid(10, 2).await, Err(MarketError::Closed)));
        assert!(matches!(
            market.finalize(&guild, 10, OWNER, 2).await,
            Err(MarketError::Closed)
        ));
    }

    #[tokio::test]
    async fn channel_failure_leaves_no_deal_record() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;
        let guild = FakeGuild {
            refuse_channel: true,
            ..Default::default()
        };
        market.submit_bid(10, bid(2, "$50")).await.unwrap();

        let err = market.finalize(&guild, 10, OWNER, 2).await.unwrap_err();
        assert!(matches!(err, MarketError::Platform(_)));
        assert_eq!(market.job(10).await.unwrap().state, JobState::Open);
        assert!(market.deal(1042).await.is_none());

        market.submit_bid(10, bid(3, "$60")).await.unwrap();
        assert_eq!(market.bids(10).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_deal_write_removes_the_opened_channel() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;
        let guild = FakeGuild::default();
        market.submit_bid(10, bid(2, "$50")).await.unwrap();
        market.submit_bid(10, bid(3, "$75")).await.unwrap();
        market.submit_bid(10, bid(4, "$60")).await.unwrap();
        std::fs::create_dir(dir.path().join("deal_tickets.json.tmp")).unwrap();

        let err = market.finalize(&guild, 10, OWNER, 3).await.unwrap_err();
        assert!(matches!(err, MarketError::Store(_)));
        assert!(guild.opened.load(Ordering::SeqCst));
        assert_eq!(*guild.removed.lock().unwrap(), vec![900]);
        assert_eq!(market.job(10).await.unwrap().state, JobState::Open);
        assert!(market.deal(1042).await.is_none());
        assert_eq!(market.bids(10).await.len(), 3);

        std::fs::remove_dir(dir.path().join("deal_tickets.json.tmp")).unwrap();
        let ticket = market.finalize(&guild, 10, OWNER, 3).await.unwrap();
        assert_eq!(ticket.deal_number, 1043);
        assert_eq!(ticket.channel_id, 901);
    }

    #[tokio::test]
    async fn deal_status_follows_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let market = market_with_job(&dir).await;
        let guild = FakeGuild::default();
        market.submit_bid(10, bid(2, "$50")).await.unwrap();
        let ticket = market.finalize(&guild, 10, OWNER, 2).await.unwrap();
        let n = ticket.deal_number;

        assert!(matches!(
            market.advance_deal(n, DealStatus::Completed).await,
            Err(MarketError::InvalidTransition { .. })
        ));
        for step in [
            DealStatus::PaymentPending,
            DealStatus::PaymentConfirmed,
            DealStatus::InProgress,
            DealStatus::Completed,
        ] {
            assert_eq!(market.advance_deal(n, step).await.unwrap().status, step);
        }
        assert!(matches!(
            market.advance_deal(n, DealStatus::Cancelled).await,
            Err(MarketError::InvalidTransition { .. })
        ));
        assert!(matches!(
            market.advance_deal(9999, DealStatus::Cancelled).await,
            Err(MarketError::UnknownDeal(9999))
        ));
    }

    #[tokio::test]
    async fn job_state_serializes_with_tag() {
        let json = serde_json::to_value(JobState::Finalized {
            deal_number: 1042,
            seller_id: 3,
        })
        .unwrap();
        assert_eq!(json["state"], "finalized");
        assert_eq!(json["deal_number"], 1042);
    }
}
