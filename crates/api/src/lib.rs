//! HTTP API: enqueue certificate jobs, expose process status and artifact
//! links.

pub mod app;
