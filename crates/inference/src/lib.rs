//! Inference stream client and aggregator.
//!
//! The inference service answers an analysis request with a chunked body
//! that interleaves three line formats (AI SDK data-stream parts, SSE
//! `data:` events, and plain text). This crate opens that stream
//! ([`api`]), decodes it incrementally ([`decoder`]), classifies each line
//! ([`fragment`]), and folds the text deltas into
//! [`AccumulatedDiagnosis`](ctlens_core::types::AccumulatedDiagnosis)
//! snapshots ([`aggregator`]).

pub mod aggregator;
pub mod api;
pub mod decoder;
pub mod fragment;
