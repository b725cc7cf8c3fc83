//! Event keys for the domain payloads this system carries.

use certmill_core::CertificatePayload;

use crate::event::Event;

impl Event for CertificatePayload {
    const KEY: &'static str = "CertificateEvent";
}
