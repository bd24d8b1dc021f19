//! Job tracking pipeline: polling, the one-shot analysis trigger, and the
//! orchestrator that ties the compression and inference services together.
//!
//! One [`JobPoller`](poller::JobPoller) task runs per tracked job. When the
//! job reaches `analyzing` the poller fires the analysis session exactly
//! once (guarded by a [`TriggerLatch`](latch::TriggerLatch)), then waits
//! for its outcome to settle the final stage. Lifecycle events go out on
//! the [`EventBus`](events::EventBus).

pub mod config;
pub mod events;
pub mod latch;
pub mod orchestrator;
pub mod poller;
pub mod session;
pub mod tracker;
