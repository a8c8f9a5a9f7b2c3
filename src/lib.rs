//! Bestsellers cache library
//!
//! Serves per-market bestseller tables from memory, a persistent store, or
//! the network, keeping network traffic low and degrading to cached data
//! when sources are unreachable.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod fetch;
pub mod logging;
pub mod output;
