//! Shared library modules for the migwatch migration watcher.
//!
//! Re-exports the detection core and its collaborators for the main
//! binary and for tests.

pub mod config;
pub mod detect;
pub mod ledger;
pub mod notify;
pub mod scrape;
pub mod tier;
pub mod timeparse;
