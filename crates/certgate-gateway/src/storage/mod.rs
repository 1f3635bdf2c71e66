//! SQLite storage for the certificate gateway.
//!
//! Provides persistence for held certificates, configuration, hashed
//! credentials, the scheduler flag, and the kill-switch attempt log.

mod db;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::{unix_timestamp_ms, GatewayStore, StoreError};
pub use models::CertificateRecord;
