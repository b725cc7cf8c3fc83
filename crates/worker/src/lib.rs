//! Certificate worker: consumes certificate events and drives each job
//! through claim, generation and ledger bookkeeping.

pub mod handler;

pub use handler::CertificateEventHandler;
