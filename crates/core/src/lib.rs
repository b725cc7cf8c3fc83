//! `certmill-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod certificate;
pub mod error;
pub mod id;
pub mod process;

pub use certificate::{Certificate, CertificatePayload};
pub use error::{DomainError, DomainResult};
pub use id::{EventId, ProcessId};
pub use process::{ProcessRecord, ProcessStatus};
