//! Pushgate - push-time incremental violation gate
//!
//! Pushgate is a pre-push client for a hosted code-quality analysis
//! service. Given the two revisions of a push it computes which source
//! lines were newly introduced, sends only the affected files to the
//! remote analyzer under bounded concurrency and a deadline, and fails
//! the push only when violations land on lines the author touched.

pub mod analysis;
pub mod cli;
pub mod client;
pub mod diff;
pub mod filter;
pub mod gate;
pub mod git;
pub mod lang;
pub mod models;
pub mod ruleset;
