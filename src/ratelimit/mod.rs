//! Rate limiting
//!
//! This module provides the dispatch token bucket.

pub mod limiter;

pub use limiter::{RateLimiter, RateLimiterConfig};
