//! Recurring household bills: templates, monthly payment instances, and
//! their reconciliation against a ledger of observed transactions.

pub mod bills;
pub mod db;
pub mod error;
pub mod fmt;
pub mod importer;
pub mod ledger;
pub mod matcher;
pub mod models;
pub mod payments;
pub mod reports;
pub mod settings;
pub mod sweep;
