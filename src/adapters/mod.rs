//! Exchange adapters
//!
//! This module defines the Exchange trait and a paper implementation.

pub mod exchange;

pub use exchange::{shared, Exchange, PaperExchange, SharedExchange};
