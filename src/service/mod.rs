//! Service layer
//!
//! Business logic of the retrieval engine: token lifecycle, page
//! merging, quota accounting and the orchestration loop.

mod fetch;
mod merge;
mod quota;
mod token;

pub use fetch::{
    FetchBudget, FetchEvent, FetchOrchestrator, FetchOutcome, FetchProgress, FetchRequest,
    FetchTier, UserLocks,
};
pub use merge::merge_page;
pub use quota::QuotaLedger;
pub use token::TokenGuard;
