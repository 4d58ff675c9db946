//! Crowdfunding platform backend.
//!
//! The REST surface lives in [`api`]; campaign, donation, voting and
//! withdrawal rules come from the `crowdfund_protocol` crate and are applied
//! here against the SQLite store in [`db`].

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod errors;
pub mod kyc;
pub mod notify;
pub mod session;
pub mod uploads;
