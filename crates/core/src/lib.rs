//! Domain model and pure logic for CT scan job tracking.
//!
//! Everything in this crate is synchronous and free of I/O: the stage
//! mapping table, finding extraction, the bounded per-job stores, and the
//! shared error taxonomy. The network-facing crates build on these types.

pub mod error;
pub mod findings;
pub mod stage;
pub mod store;
pub mod types;
