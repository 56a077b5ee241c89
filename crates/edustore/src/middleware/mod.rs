// Request-level guards applied before any handler runs.

pub mod rate_limiter;

pub use rate_limiter::{RateLimitRule, RateLimiter};
