//! Time-lock encryption service.
//!
//! Content is encrypted to a future round of a drand-style randomness beacon
//! and stays cryptographically unreadable until the beacon publishes that
//! round's signature. The HTTP surface covers item lifecycle (create, read,
//! extend, delete), listing, stats, and bearer-token administration.

pub mod beacon;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod services;
pub mod telemetry;
