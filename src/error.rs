//! Domain error types.
//!
//! Every feature reports failures through one of these enums. Handlers turn
//! them into a short ephemeral reply via `user_message()` and log the full
//! error server-side.

use thiserror::Error;

use crate::market::DealStatus;

/// Failure while persisting a JSON document.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize store document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Rejections and failures of the bidding/deal workflow.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("job {0} is not a known posting")]
    UnknownJob(u64),

    #[error("job already has the maximum of {0} bids")]
    BidLimitExceeded(usize),

    #[error("user already has a bid on this job")]
    DuplicateBidder,

    #[error("job owner cannot bid on their own job")]
    OwnJob,

    #[error("posting is no longer accepting changes")]
    Closed,

    #[error("user has no bid on this job")]
    NoBid,

    #[error("only the job owner may do this")]
    NotOwner,

    #[error("job has no bids to choose from")]
    NoBids,

    #[error("selected user has not bid on this job")]
    NotABidder,

    #[error("selected bidder is no longer a member of the server")]
    BidderLeft,

    #[error("deal #{0} does not exist")]
    UnknownDeal(u64),

    #[error("deal cannot move from {from} to {to}")]
    InvalidTransition { from: DealStatus, to: DealStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Boxed, `serenity::Error` is large.
    #[error(transparent)]
    Platform(Box<serenity::Error>),
}

impl From<serenity::Error> for MarketError {
    fn from(err: serenity::Error) -> Self {
        MarketError::Platform(Box::new(err))
    }
}

impl MarketError {
    pub fn user_message(&self) -> String {
        match self {
            MarketError::UnknownJob(_) => "❌ This job posting is no longer tracked.".to_string(),
            MarketError::BidLimitExceeded(max) => {
                format!("❌ This job already has the maximum of {} bids.", max)
            }
            MarketError::DuplicateBidder => {
                "❌ You have already placed a bid on this job. Withdraw it first to bid again.".to_string()
            }
            MarketError::OwnJob => "❌ You cannot bid on your own job.".to_string(),
            MarketError::Closed => "🔒 This job has been finalized and is locked.".to_string(),
            MarketError::NoBid => "❌ There is no bid from that user on this job.".to_string(),
            MarketError::NotOwner => "❌ Only the person who posted this job can do that.".to_string(),
            MarketError::NoBids => "❌ This job has no bids yet.".to_string(),
            MarketError::NotABidder => "❌ That user has not bid on this job.".to_string(),
            MarketError::BidderLeft => "❌ The selected bidder is no longer in the server.".to_string(),
            MarketError::UnknownDeal(n) => format!("❌ Deal #{} was not found.", n),
            MarketError::InvalidTransition { from, to } => {
                format!("❌ Deal cannot move from **{}** to **{}**.", from, to)
            }
            MarketError::Store(_) => "❌ Could not save the change. Please try again.".to_string(),
            MarketError::Platform(_) => {
                "❌ Discord rejected the request. Check the bot's permissions.".to_string()
            }
        }
    }
}

/// Failures of the profile approval workflow.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("caller is not allowed to review profiles")]
    Unauthorized,

    #[error("no pending submission for user {0}")]
    NoSubmission(u64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProfileError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ProfileError::Unauthorized => "You do not have permission to review profiles.",
            ProfileError::NoSubmission(_) => "This submission has already been handled.",
            ProfileError::Store(_) => "❌ Could not save the profile. Please try again.",
        }
    }
}
