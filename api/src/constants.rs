//! Application constants

/// Items requested per upstream feed page. A shorter page ends the walk.
pub const FEED_PAGE_SIZE: usize = 50;

/// Pause between consecutive feed pages to stay under the upstream rate limit
pub const FEED_PAGE_DELAY_MS: u64 = 350;

/// Default upstream feedback API base URL
pub const DEFAULT_FEED_BASE_URL: &str = "https://feedbacks-api.marketplace.example";

/// Credits consumed by one published response
pub const CREDITS_PER_REPLY: i64 = 1;

/// Days an answered item stays visible before the archiver moves it
pub const DEFAULT_ARCHIVE_AFTER_DAYS: i64 = 30;

/// How long a credential-setup handshake stays open (15 minutes)
pub const CREDENTIAL_SETUP_TTL_SECS: i64 = 15 * 60;

/// Lease a publisher holds on a stored item while it spends and submits
pub const PUBLISH_CLAIM_TTL_SECS: i64 = 120;

/// Fast model used for routine replies
pub const FAST_MODEL: &str = "gemini-2.5-flash";

/// Model used for negative and image-bearing reviews
pub const CAPABLE_MODEL: &str = "gemini-2.5-pro";

pub const FAST_MAX_TOKENS: u32 = 400;
pub const CAPABLE_MAX_TOKENS: u32 = 800;

/// Author names the platform assigns to anonymized reviews. Never addressed by name.
pub const ANONYMOUS_AUTHOR_NAMES: &[&str] = &["", "покупатель", "customer", "buyer", "anonymous"];

/// Default page size for paginated list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for paginated list endpoints
pub const MAX_PAGE_SIZE: i64 = 100;
