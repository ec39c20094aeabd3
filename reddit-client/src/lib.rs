pub mod api;
pub mod rate_limiter;

pub use api::{RedditApiClient, RedditListing, RedditPostData};
pub use rate_limiter::{RateBudget, RateBudgetConfig, RateBudgetGrant, RateBudgetStatus};
