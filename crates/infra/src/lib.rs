//! Infrastructure for the certificate pipeline: durable process ledger,
//! certificate store, object storage, renderers and the generation service,
//! plus environment-backed configuration.
//!
//! Every external collaborator sits behind a trait with a production
//! implementation (Postgres, HTTP gateway, subprocess) and an in-memory fake
//! with identical semantics for tests.

pub mod certificates;
pub mod config;
pub mod generation;
pub mod ledger;
pub mod render;
pub mod storage;

pub use config::Settings;
