//! Kalshi integration for the live trade relay
//!
//! This crate provides a signed client for the Kalshi REST API. The relay
//! only needs the portfolio fills endpoint, which serves as the upstream
//! source of last resort when the trading agent and the cache are both
//! unavailable.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::KalshiCredentials;
pub use client::{KalshiClient, KALSHI_API_BASE, KALSHI_DEMO_API_BASE};
