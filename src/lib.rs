//! AI Quota - two-tier sliding-window admission control
//!
//! This crate limits how many AI-assisted operations a user may trigger per
//! rolling day and rolling week. Windows live in a shared store (Redis) and
//! are checked and updated in one atomic step, so the limits hold across
//! every process that shares the store.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
