pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod constants;
#[cfg(feature = "db")]
pub mod db;
pub mod domain;
pub mod drops;
pub mod email;
pub mod error;
pub mod guard;
pub mod logging;
pub mod metrics;
pub mod objects;
pub mod payments;
pub mod server;
pub mod storage;
pub mod tasks;
pub mod tiers;
pub mod usage;
