//! Client library for the CT compression job service.
//!
//! Provides typed wire messages, a REST client behind the
//! [`CompressionService`](api::CompressionService) trait, and the bundle
//! materializer that turns a completed job's artifacts into an
//! [`AnalyzablePayload`](ctlens_core::types::AnalyzablePayload).

pub mod api;
pub mod bundle;
pub mod messages;
