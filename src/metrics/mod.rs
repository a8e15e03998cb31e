//! Queueing metrics: `queuedRequestCounter` and
//! `queuedRequestDurationHistogram`, both tagged by function name (spec §6).
mod histogram;
mod registry;


pub use histogram::LatencyHistogram;
pub use registry::Metrics;
