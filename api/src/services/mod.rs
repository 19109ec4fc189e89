pub mod error;
pub mod feed;
pub mod generation;
pub mod rate_limit;
