//! Core domain types and logic.

pub mod action;
pub mod channel;
pub mod config_validation;
pub mod converter;
pub mod currency;
pub mod error;
pub mod event;
pub mod metrics;
pub mod multi_asset_series;
pub mod optimizer;
pub mod playback;
pub mod price_bar_series;
pub mod run_registry;
pub mod search_space;
pub mod sma_cross;
pub mod timeframe;
pub mod trial;
