use serde::Serialize;
use serde::de::DeserializeOwned;

/// A broker-distributed event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **self-describing** (the key identifies the type on the wire)
/// - carried inside an [`EventEnvelope`](crate::EventEnvelope) while in flight
///
/// `KEY` is the nominal event-type name (e.g. `"CertificateEvent"`). It is
/// the registry lookup key and the input to the topology naming convention,
/// so renaming it renames queues and exchanges for existing deployments.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable event-type key.
    const KEY: &'static str;
}
