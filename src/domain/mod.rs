//! Core domain types and decision logic.

pub mod ohlcv;
pub mod series;
pub mod calendar;
pub mod position;
pub mod portfolio;
pub mod order;
pub mod indicator;
pub mod momentum;
pub mod cluster;
pub mod risk;
pub mod sizing;
pub mod execution;
pub mod signal;
pub mod config;
pub mod config_validation;
pub mod orchestrator;
pub mod replay;
pub mod metrics;
pub mod universe;
pub mod error;
